use crate::engine::{InjectError, KeySynthesizer, SynthesisGuard};
use crate::mode::Mode;
use crate::types::{KeyAction, KeyCode, KeyEdge, KeyEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, error, info};
use windows::Win32::Foundation::{BOOL, HINSTANCE, LPARAM, LRESULT, TRUE, WPARAM};
use windows::Win32::System::Console::SetConsoleCtrlHandler;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    MapVirtualKeyW, SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, MAPVK_VK_TO_VSC, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostQuitMessage,
    PostThreadMessageW, SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, HHOOK,
    KBDLLHOOKSTRUCT, MSG, PEEK_MESSAGE_REMOVE_TYPE, WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP,
    WM_QUIT, WM_SYSKEYDOWN, WM_SYSKEYUP,
};

/// Magic number to identify our own injected events.
const INJECTED_EXTRA_INFO: usize = 0xABC3_5A3E;

static HOOK_HANDLE: Mutex<Option<HHOOK>> = parking_lot::const_mutex(None);
static HOOK_THREAD_ID: AtomicU32 = AtomicU32::new(0);

lazy_static::lazy_static! {
    static ref ACTIVE_MODE: Mutex<Option<Mode>> = Mutex::new(None);
    static ref HOOK_GUARD: SynthesisGuard = SynthesisGuard::default();
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("failed to install keyboard hook: {0}")]
    Install(String),
    #[error("keyboard hook is already installed")]
    AlreadyInstalled,
}

/// Guard shared with the hook callback; hand it to the [`RemapEngine`].
///
/// [`RemapEngine`]: crate::engine::RemapEngine
pub fn synthesis_guard() -> SynthesisGuard {
    HOOK_GUARD.clone()
}

/// Attaches `mode` as the only consumer and starts the keyboard hook.
/// This must be called from the thread that will run [`run_event_loop`].
pub fn install_hook(mode: Mode) -> Result<(), HookError> {
    info!("Setting hook...");
    let mut handle = HOOK_HANDLE.lock();
    if handle.is_some() {
        return Err(HookError::AlreadyInstalled);
    }
    *ACTIVE_MODE.lock() = Some(mode);

    // Low-level hooks require hMod to be NULL if threadId is 0.
    let hook_id = match unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(hook_proc), HINSTANCE::default(), 0) } {
        Ok(h) if !h.is_invalid() => h,
        Ok(_) => {
            ACTIVE_MODE.lock().take();
            return Err(HookError::Install("SetWindowsHookExW returned a null handle".into()));
        }
        Err(e) => {
            ACTIVE_MODE.lock().take();
            error!("SetWindowsHookExW failed: {}", e);
            return Err(HookError::Install(e.to_string()));
        }
    };

    *handle = Some(hook_id);
    HOOK_THREAD_ID.store(unsafe { GetCurrentThreadId() }, Ordering::Release);
    info!("Hook set OK. Handle: {:?}", hook_id);
    Ok(())
}

/// Removes the hook and hands back the consumer that was attached.
pub fn uninstall_hook() -> Option<Mode> {
    let mut handle = HOOK_HANDLE.lock();
    if let Some(h) = handle.take() {
        unsafe {
            let _ = UnhookWindowsHookEx(h);
        };
        info!("Keyboard hook uninstalled.");
    }
    ACTIVE_MODE.lock().take()
}

/// Runs a blocking message loop until [`request_exit`] or a finished mode
/// posts `WM_QUIT`.
pub fn run_event_loop() {
    info!("Starting message loop...");
    let mut msg = MSG::default();
    unsafe {
        // Force message queue creation
        let _ = PeekMessageW(&mut msg, None, 0, 0, PEEK_MESSAGE_REMOVE_TYPE(0));

        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
    info!("Message loop exited.");
}

/// Asks the hook thread's message loop to stop. Safe from any thread.
pub fn request_exit() {
    let thread_id = HOOK_THREAD_ID.load(Ordering::Acquire);
    if thread_id != 0 {
        unsafe {
            let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }
}

unsafe extern "system" fn console_ctrl_handler(ctrl_type: u32) -> BOOL {
    info!("Console control event {}, shutting down...", ctrl_type);
    request_exit();
    TRUE
}

/// Routes Ctrl+C / console close to [`request_exit`].
pub fn install_ctrl_handler() -> Result<(), HookError> {
    unsafe { SetConsoleCtrlHandler(Some(console_ctrl_handler), TRUE) }
        .map_err(|e| HookError::Install(format!("console control handler: {}", e)))
}

unsafe extern "system" fn hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code < 0 {
        return CallNextHookEx(None, code, wparam, lparam);
    }

    let kbd = &*(lparam.0 as *const KBDLLHOOKSTRUCT);

    let edge = match wparam.0 as u32 {
        WM_KEYDOWN | WM_SYSKEYDOWN => KeyEdge::Down,
        WM_KEYUP | WM_SYSKEYUP => KeyEdge::Up,
        _ => return CallNextHookEx(None, code, wparam, lparam),
    };

    // Our own taps, possibly delivered re-entrantly from inside SendInput.
    // Checked before taking the mode lock.
    if kbd.dwExtraInfo == INJECTED_EXTRA_INFO || HOOK_GUARD.is_active() {
        return CallNextHookEx(None, code, wparam, lparam);
    }

    let event = KeyEvent {
        key: KeyCode::new(kbd.vkCode as u16),
        edge,
        injected: false,
    };

    let (action, finished) = {
        let mut slot = ACTIVE_MODE.lock();
        match slot.as_mut() {
            Some(mode) => (mode.process_key(event), mode.is_finished()),
            None => (KeyAction::Pass, false),
        }
    };

    if finished {
        PostQuitMessage(0);
    }

    match action {
        KeyAction::Pass => CallNextHookEx(None, code, wparam, lparam),
        KeyAction::Block => LRESULT(1),
    }
}

/// Injects virtual-key events with `SendInput`, tagged so the hook skips them.
#[derive(Debug, Default)]
pub struct WindowsSynthesizer;

impl KeySynthesizer for WindowsSynthesizer {
    fn send(&mut self, key: KeyCode, edge: KeyEdge) -> Result<(), InjectError> {
        let flags = match edge {
            KeyEdge::Down => KEYBD_EVENT_FLAGS(0),
            KeyEdge::Up => KEYEVENTF_KEYUP,
        };
        let scan = unsafe { MapVirtualKeyW(key.vk() as u32, MAPVK_VK_TO_VSC) } as u16;

        let input = INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(key.vk()),
                    wScan: scan,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: INJECTED_EXTRA_INFO,
                },
            },
        };

        let sent = unsafe { SendInput(&[input], std::mem::size_of::<INPUT>() as i32) };
        if sent == 0 {
            return Err(InjectError::Rejected {
                key,
                edge,
                reason: windows::core::Error::from_win32().to_string(),
            });
        }
        debug!("Injected {} {:?}", key, edge);
        Ok(())
    }
}
