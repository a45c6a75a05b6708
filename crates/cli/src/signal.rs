//! Turn Ctrl-C into a cancellation of the running build.
//!
//! Steps run in their own process groups, so the terminal's SIGINT no longer
//! reaches them directly; the runner forwards it as SIGTERM and then SIGKILL.

use buildstep_core::CancellationToken;

#[cfg(unix)]
mod imp {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use buildstep_core::CancellationToken;

    static INTERRUPTED: AtomicBool = AtomicBool::new(false);

    extern "C" fn on_signal(_: libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }

    pub fn cancel_on_interrupt(token: &CancellationToken) {
        let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
        unsafe {
            libc::signal(libc::SIGINT, handler);
            libc::signal(libc::SIGTERM, handler);
        }

        let token = token.clone();
        let spawned = thread::Builder::new()
            .name("buildstep-signal".to_string())
            .spawn(move || {
                while !INTERRUPTED.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(50));
                }
                eprintln!("\n🛑 Interrupted, stopping running steps...");
                token.cancel();
            });
        if let Err(e) = spawned {
            tracing::warn!("Signal watcher not started: {}", e);
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use buildstep_core::CancellationToken;

    pub fn cancel_on_interrupt(_token: &CancellationToken) {}
}

/// Cancel `token` when the process receives SIGINT or SIGTERM.
pub fn cancel_on_interrupt(token: &CancellationToken) {
    imp::cancel_on_interrupt(token);
}
