use std::ffi::CString;

use converse::ConverserData;
use error::pam_err;
pub use error::{PamError, PamErrorType, PamResult};
use sys::*;

mod converse;
mod error;

#[allow(nonstandard_style)]
#[allow(unused)]
pub mod sys;

pub use converse::{CLIConverser, Converser};

pub struct PamContext<C: Converser> {
    data_ptr: *mut ConverserData<C>,
    pamh: *mut pam_handle_t,
    session_started: bool,
    cred_established: bool,
}

impl PamContext<CLIConverser> {
    /// Start a PAM transaction for the given service, initially authenticating
    /// the given user, conversing on the controlling terminal.
    pub fn start_cli(
        service_name: &str,
        user: &str,
        prompt: String,
        no_interact: bool,
    ) -> PamResult<PamContext<CLIConverser>> {
        let c_service_name = CString::new(service_name)?;
        let c_user = CString::new(user)?;

        // this will be de-allocated explicitly in this type's drop method
        let data_ptr = Box::into_raw(Box::new(ConverserData {
            converser: CLIConverser { prompt },
            no_interact,
            error: None,
            panicked: false,
        }));

        let mut pamh = std::ptr::null_mut();
        // SAFETY: we pass valid C strings, a valid conversation descriptor
        // holding the data_ptr above, and an out-pointer for the handle
        let res = unsafe {
            pam_start(
                c_service_name.as_ptr(),
                c_user.as_ptr(),
                &pam_conv {
                    conv: Some(converse::converse::<CLIConverser>),
                    appdata_ptr: data_ptr as *mut libc::c_void,
                },
                &mut pamh,
            )
        };

        pam_err(res)?;

        if pamh.is_null() {
            Err(PamError::InvalidState)
        } else {
            Ok(PamContext {
                data_ptr,
                pamh,
                session_started: false,
                cred_established: false,
            })
        }
    }
}

impl<C: Converser> PamContext<C> {
    /// Run authentication for the account
    pub fn authenticate(&mut self) -> PamResult<()> {
        // SAFETY: the handle is valid for the lifetime of self
        pam_err(unsafe { pam_authenticate(self.pamh, PAM_DISALLOW_NULL_AUTHTOK as i32) })?;

        if self.has_panicked() {
            panic!("Panic during pam authentication");
        }
        Ok(())
    }

    /// Check that the account is valid; if that fails because the
    /// authentication token expired, request a new one from the user.
    pub fn validate_account_or_change_auth_token(&mut self) -> PamResult<()> {
        // SAFETY: the handle is valid
        match pam_err(unsafe { pam_acct_mgmt(self.pamh, PAM_DISALLOW_NULL_AUTHTOK as i32) }) {
            Ok(()) => Ok(()),
            Err(PamError::Pam(PamErrorType::NewAuthTokenRequired)) => {
                // SAFETY: the handle is valid
                pam_err(unsafe {
                    pam_chauthtok(self.pamh, PAM_CHANGE_EXPIRED_AUTHTOK as libc::c_int)
                })
            }
            Err(e) => Err(e),
        }
    }

    fn set_item(&mut self, item_type: u32, value: &str) -> PamResult<()> {
        let data = CString::new(value)?;
        // SAFETY: the handle is valid; pam_set_item copies the string
        pam_err(unsafe {
            pam_set_item(
                self.pamh,
                item_type as libc::c_int,
                data.as_ptr() as *const libc::c_void,
            )
        })
    }

    /// Set the user that will be authenticated (and, later, whose session
    /// is opened).
    pub fn set_user(&mut self, user: &str) -> PamResult<()> {
        self.set_item(PAM_USER, user)
    }

    /// Set the TTY path for the current TTY that this PAM session started from.
    pub fn set_tty(&mut self, tty_path: &str) -> PamResult<()> {
        self.set_item(PAM_TTY, tty_path)
    }

    /// Set the user that requested the actions in this PAM instance.
    pub fn set_requesting_user(&mut self, user: &str) -> PamResult<()> {
        self.set_item(PAM_RUSER, user)
    }

    /// Re-initialize the credentials stored in PAM for the (new) target user.
    pub fn credentials_reinitialize(&mut self) -> PamResult<()> {
        // SAFETY: the handle is valid
        pam_err(unsafe { pam_setcred(self.pamh, PAM_REINITIALIZE_CRED as libc::c_int) })?;
        self.cred_established = true;
        Ok(())
    }

    /// Start a user session for the authenticated user.
    pub fn open_session(&mut self) -> PamResult<()> {
        if !self.session_started {
            // SAFETY: the handle is valid
            pam_err(unsafe { pam_open_session(self.pamh, 0) })?;
            self.session_started = true;
            Ok(())
        } else {
            Err(PamError::InvalidState)
        }
    }

    /// Check if anything panicked since the last call.
    pub fn has_panicked(&self) -> bool {
        // SAFETY: data_ptr was created by Box::into_raw and is only freed on drop
        unsafe { (*self.data_ptr).panicked }
    }
}

impl<C: Converser> Drop for PamContext<C> {
    fn drop(&mut self) {
        // data_ptr's pointee is de-allocated in this scope
        // SAFETY: the pointer came from Box::into_raw in the constructor
        let _data = unsafe { Box::from_raw(self.data_ptr) };

        if self.session_started {
            // SAFETY: the handle is valid
            let _ = unsafe { pam_close_session(self.pamh, 0) };
        }
        if self.cred_established {
            // SAFETY: the handle is valid
            let _ = unsafe {
                pam_setcred(self.pamh, (PAM_DELETE_CRED | PAM_SILENT) as libc::c_int)
            };
        }

        // It looks like PAM_DATA_SILENT is important to set for our context, but
        // it is unclear what it really does and does not do, other than the vague
        // documentation description to 'not take the call too seriously'
        // Also see https://github.com/systemd/systemd/issues/22318
        // SAFETY: the handle is valid; pam_end invalidates it, but self is
        // going away with it
        unsafe {
            pam_end(
                self.pamh,
                PAM_SUCCESS as libc::c_int | PAM_DATA_SILENT as i32,
            )
        };
    }
}
