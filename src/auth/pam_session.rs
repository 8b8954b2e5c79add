//! The PAM authentication flow, including the parent process that stays
//! behind to close the PAM session once the command finishes.

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use crate::common::Error;
use crate::cutils::string_from_ptr;
use crate::log::{auth_warn, user_warn};
use crate::pam::{CLIConverser, PamContext};
use crate::system::interface::ProcessId;
use crate::system::signal::{self, SignalNumber, SignalSet};
use crate::system::wait::{waitpid, WaitOptions};
use crate::system::{fork, kill, term, ForkResult};

use super::{password_prompt, AuthRequest};

const PAM_SERVICE_NAME: &str = "doas";

pub fn authenticate(request: &AuthRequest) -> Result<(), Error> {
    let invoker = &request.invoker.name;

    let mut pam = PamContext::start_cli(
        PAM_SERVICE_NAME,
        invoker,
        password_prompt(invoker),
        !request.interactive,
    )?;
    pam.set_requesting_user(invoker)?;

    // attempt to set the TTY this session is communicating on; its absence
    // is only fatal if we actually have to prompt
    if let Ok(tty_path) = term::current_tty_name() {
        let tty_path = tty_path.to_string_lossy();
        let tty = tty_path.strip_prefix("/dev/").unwrap_or(&tty_path);
        pam.set_tty(tty)?;
    }

    authenticate_invoker(&mut pam, request)?;
    pam.validate_account_or_change_auth_token()?;

    // switch PAM over to the target user before opening the session
    pam.set_user(request.target_name)?;
    // errors are ignored because not all modules support this functionality
    if let Err(err) = pam.credentials_reinitialize() {
        user_warn!("PAM gave an error while re-initializing credentials: {err}");
    }
    pam.open_session()?;

    // the child carries on with the exec pipeline; the parent waits for it
    // and then tears the PAM session down
    // SAFETY: the process is single threaded
    match unsafe { fork() }? {
        ForkResult::Child => {
            // the parent owns the session now; closing it from the child as
            // well would tear it down twice
            std::mem::forget(pam);
            Ok(())
        }
        ForkResult::Parent(child) => watch_session(child, pam),
    }
}

/// Verify the invoker's identity, unless the rule or a live persistence
/// token says we don't have to.
fn authenticate_invoker(
    pam: &mut PamContext<CLIConverser>,
    request: &AuthRequest,
) -> Result<(), Error> {
    if request.nopass {
        return Ok(());
    }

    #[cfg(feature = "timestamp")]
    {
        use crate::system::timestamp;

        let mut token = if request.persist {
            Some(timestamp::open(timestamp::LIFETIME).map_err(|err| Error::auth(&err.to_string()))?)
        } else {
            None
        };

        if !matches!(token, Some((_, true))) {
            prompt_for_password(pam, request)?;
        }

        if let Some((file, _)) = &mut token {
            // failing to refresh the token only means the next invocation
            // prompts again
            let _ = timestamp::set(file, timestamp::LIFETIME);
        }

        Ok(())
    }

    #[cfg(not(feature = "timestamp"))]
    prompt_for_password(pam, request)
}

fn prompt_for_password(
    pam: &mut PamContext<CLIConverser>,
    request: &AuthRequest,
) -> Result<(), Error> {
    if !request.interactive {
        auth_warn!("a password is required for {}", request.invoker.name);
        return Err(Error::auth("Authorization required"));
    }
    pam.authenticate().map_err(|err| {
        auth_warn!("failed auth for {}", request.invoker.name);
        err.into()
    })
}

static CAUGHT_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn catch_signal(signal: SignalNumber) {
    // the only thing the handler may do is latch the signal number
    CAUGHT_SIGNAL.store(signal, Ordering::SeqCst);
}

const FORWARDED_SIGNALS: [SignalNumber; 3] = [libc::SIGTERM, libc::SIGALRM, libc::SIGTSTP];

fn signal_description(signal: SignalNumber) -> String {
    // SAFETY: strsignal returns a pointer into static libc storage (or NULL
    // for nonsense numbers), which we only read
    unsafe { string_from_ptr(libc::strsignal(signal)) }
}

/// Wait for the command to finish, then close the PAM session and delete the
/// credentials (exactly once, whether the child exited or we were signalled).
/// Termination by signal is reported as an exit status of 128 + the signal
/// number, and a signal caught by us is re-raised after cleanup so our own
/// exit status reflects it too.
fn watch_session(child: ProcessId, pam: PamContext<CLIConverser>) -> ! {
    let mut status_code = 1;

    // block everything, then let only the forwarded signals through to the
    // latch while we wait
    let arm_signals = || -> std::io::Result<Vec<(SignalNumber, signal::SignalAction)>> {
        SignalSet::full()?.block()?;

        let mut saved = Vec::new();
        let mut set = SignalSet::empty()?;
        for signal in FORWARDED_SIGNALS {
            set.add(signal)?;
            saved.push((signal, signal::set_handler(signal, catch_signal)?));
        }
        set.unblock()?;
        Ok(saved)
    };

    let saved_handlers = match arm_signals() {
        Ok(saved) => saved,
        Err(err) => {
            user_warn!("failed to set up signal handling: {err}");
            CAUGHT_SIGNAL.store(libc::SIGTERM, Ordering::SeqCst);
            Vec::new()
        }
    };

    if CAUGHT_SIGNAL.load(Ordering::SeqCst) == 0 {
        match waitpid(child, WaitOptions::new()) {
            Ok((_, status)) => {
                if let Some(signal) = status.term_signal() {
                    eprintln_ignore_io_error!("{}", signal_description(signal));
                    status_code = 128 + signal;
                } else {
                    status_code = status.exit_status().unwrap_or(1);
                }
            }
            Err(_) => {
                let caught = CAUGHT_SIGNAL.load(Ordering::SeqCst);
                if caught != 0 {
                    status_code = 128 + caught;
                }
            }
        }
    }

    let caught = CAUGHT_SIGNAL.load(Ordering::SeqCst);
    if caught != 0 {
        eprintln_ignore_io_error!("\nSession terminated, killing shell");
        let _ = kill(child, libc::SIGTERM);
    }

    // session close and credential deletion happen here, exactly once
    drop(pam);

    if caught != 0 {
        std::thread::sleep(Duration::from_secs(2));
        let _ = kill(child, libc::SIGKILL);
        eprintln_ignore_io_error!(" ...killed.");

        // put the old dispositions back and re-raise, so that whoever waits
        // for us sees the signal and not just an exit code
        for (signal, old) in saved_handlers {
            let _ = signal::restore_handler(signal, old);
        }
        let _ = signal::raise(caught);
    }

    std::process::exit(status_code)
}
