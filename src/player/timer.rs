use wasm_bindgen::{JsCast, closure::Closure};

use super::error::{ScheduleError, describe_js_error};

/// Runs an action once after a delay on the same event loop.
pub trait Scheduler {
    type Handle: 'static;

    fn schedule(
        &self,
        delay_secs: f64,
        action: Box<dyn FnOnce()>,
    ) -> Result<Self::Handle, ScheduleError>;

    /// Prevents a pending action from running. Cancelling an action that
    /// already ran is a no-op.
    fn cancel(&self, handle: Self::Handle);
}

/// `window.setTimeout` backed scheduler.
#[derive(Default, Clone, Copy)]
pub struct WindowScheduler;

/// Keeps the callback alive until the timeout is cleared or the handle is
/// dropped after firing.
pub struct TimeoutHandle {
    id: i32,
    _callback: Closure<dyn FnMut()>,
}

impl Scheduler for WindowScheduler {
    type Handle = TimeoutHandle;

    fn schedule(
        &self,
        delay_secs: f64,
        action: Box<dyn FnOnce()>,
    ) -> Result<TimeoutHandle, ScheduleError> {
        let window =
            web_sys::window().ok_or_else(|| ScheduleError("no window available".into()))?;
        let callback = Closure::once(move || action());
        let delay_ms = (delay_secs * 1000.0).round().max(0.0) as i32;
        let id = window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.as_ref().unchecked_ref(),
                delay_ms,
            )
            .map_err(|err| ScheduleError(describe_js_error(&err)))?;

        Ok(TimeoutHandle {
            id,
            _callback: callback,
        })
    }

    fn cancel(&self, handle: TimeoutHandle) {
        if let Some(window) = web_sys::window() {
            window.clear_timeout_with_handle(handle.id);
        }
    }
}
