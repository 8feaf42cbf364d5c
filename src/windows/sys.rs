//! Win32 胶水 - 窗口类、消息泵与 Shell_NotifyIcon 的薄封装
//!
//! 全部调用失败时携带 `GetLastError`, 以 `io::Error` 形态上抛。

use std::ffi::c_void;
use std::io;
use std::mem;
use std::sync::OnceLock;

use windows_sys::core::GUID;
use windows_sys::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress, LoadLibraryW};
use windows_sys::Win32::UI::Shell::{Shell_NotifyIconW, DLLVERSIONINFO, NOTIFYICONDATAW};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW, PostMessageW,
    PostQuitMessage, RegisterClassExW, RegisterWindowMessageW, TranslateMessage, CREATESTRUCTW,
    GWLP_USERDATA, MSG, WNDCLASSEXW, WS_POPUP,
};

use crate::error::{Error, Result};

pub(crate) use windows_sys::Win32::UI::Shell::{
    NIF_GUID, NIF_ICON, NIF_INFO, NIF_SHOWTIP, NIF_TIP, NIIF_ERROR, NIIF_INFO, NIIF_LARGE_ICON,
    NIIF_NONE, NIIF_NOSOUND, NIIF_RESPECT_QUIET_TIME, NIIF_USER, NIIF_WARNING, NIM_ADD,
    NIM_DELETE, NIM_MODIFY, NIM_SETVERSION, NOTIFYICON_VERSION, NOTIFYICON_VERSION_4,
};
pub(crate) use windows_sys::Win32::UI::WindowsAndMessaging::{WM_CLOSE, WM_CREATE, WM_DESTROY};

const CLASS_NAME: &str = "desktop-notify.Window";

/// UTF-16 + NUL
pub(crate) fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// UTF-16 写入定长缓冲, 超长截断并保证 NUL 结尾
pub(crate) fn copy_wide(dst: &mut [u16], s: &str) {
    let mut n = 0;
    for unit in s.encode_utf16() {
        if n + 1 >= dst.len() {
            break;
        }
        dst[n] = unit;
        n += 1;
    }
    dst[n..].fill(0);
}

fn last_os_error() -> Error {
    Error::Io(io::Error::last_os_error())
}

/// NOTIFYICONDATAW 的历史版本尺寸
pub(crate) fn notify_icon_data_sizes() -> (u32, u32, u32, u32) {
    let v1 = (mem::offset_of!(NOTIFYICONDATAW, szTip) + 64 * 2) as u32;
    let v2 = mem::offset_of!(NOTIFYICONDATAW, guidItem) as u32;
    let v3 = mem::offset_of!(NOTIFYICONDATAW, hBalloonIcon) as u32;
    let v4 = mem::size_of::<NOTIFYICONDATAW>() as u32;
    (v1, v2, v3, v4)
}

type DllGetVersion = unsafe extern "system" fn(*mut DLLVERSIONINFO) -> i32;

/// shell32.dll 的版本, 决定可用的通知区域特性
pub(crate) fn shell_dll_version() -> (u32, u32, u32) {
    static VERSION: OnceLock<(u32, u32, u32)> = OnceLock::new();
    *VERSION.get_or_init(|| unsafe {
        let lib = LoadLibraryW(wide("shell32.dll").as_ptr());
        if lib == 0 {
            return (0, 0, 0);
        }
        let Some(proc) = GetProcAddress(lib, b"DllGetVersion\0".as_ptr()) else {
            return (0, 0, 0);
        };
        let dll_get_version: DllGetVersion = mem::transmute(proc);
        let mut info: DLLVERSIONINFO = mem::zeroed();
        info.cbSize = mem::size_of::<DLLVERSIONINFO>() as u32;
        if dll_get_version(&mut info) != 0 {
            return (0, 0, 0);
        }
        (info.dwMajorVersion, info.dwMinorVersion, info.dwBuildNumber)
    })
}

pub(crate) fn is_shell_version_or_greater(major: u32, minor: u32, build: u32) -> bool {
    shell_dll_version() >= (major, minor, build)
}

/// Windows 7 带 shell32 6.1
pub(crate) fn is_windows7_or_greater() -> bool {
    is_shell_version_or_greater(6, 1, 0)
}

/// 进程级一次性初始化: 窗口类 + TaskbarCreated 消息号
pub(crate) fn taskbar_created_message() -> u32 {
    static INIT: OnceLock<u32> = OnceLock::new();
    *INIT.get_or_init(|| unsafe {
        let class_name = wide(CLASS_NAME);
        let mut wcx: WNDCLASSEXW = mem::zeroed();
        wcx.cbSize = mem::size_of::<WNDCLASSEXW>() as u32;
        wcx.lpfnWndProc = Some(window_proc);
        wcx.hInstance = GetModuleHandleW(std::ptr::null());
        wcx.lpszClassName = class_name.as_ptr();
        RegisterClassExW(&wcx);

        RegisterWindowMessageW(wide("TaskbarCreated").as_ptr())
    })
}

/// 消息泵窗口的回调挂钩: WM_CREATE 时把 CreateParams 存进 userdata,
/// 其后全部转交持有者
pub(crate) trait WindowHandler {
    fn handle(&self, wnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> Option<LRESULT>;
}

unsafe extern "system" fn window_proc(
    wnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if msg == WM_CREATE {
        let cs = lparam as *const CREATESTRUCTW;
        set_window_user_data(wnd, (*cs).lpCreateParams as isize);
        return 0;
    }
    let ptr = get_window_user_data(wnd);
    if ptr != 0 {
        let handler = &*(ptr as *const super::PumpState);
        if let Some(result) = handler.handle(wnd, msg, wparam, lparam) {
            return result;
        }
    }
    DefWindowProcW(wnd, msg, wparam, lparam)
}

#[cfg(target_pointer_width = "64")]
unsafe fn set_window_user_data(wnd: HWND, data: isize) {
    use windows_sys::Win32::UI::WindowsAndMessaging::SetWindowLongPtrW;
    SetWindowLongPtrW(wnd, GWLP_USERDATA, data);
}

#[cfg(target_pointer_width = "64")]
unsafe fn get_window_user_data(wnd: HWND) -> isize {
    use windows_sys::Win32::UI::WindowsAndMessaging::GetWindowLongPtrW;
    GetWindowLongPtrW(wnd, GWLP_USERDATA)
}

#[cfg(target_pointer_width = "32")]
unsafe fn set_window_user_data(wnd: HWND, data: isize) {
    use windows_sys::Win32::UI::WindowsAndMessaging::SetWindowLongW;
    SetWindowLongW(wnd, GWLP_USERDATA, data as i32);
}

#[cfg(target_pointer_width = "32")]
unsafe fn get_window_user_data(wnd: HWND) -> isize {
    use windows_sys::Win32::UI::WindowsAndMessaging::GetWindowLongW;
    GetWindowLongW(wnd, GWLP_USERDATA) as isize
}

/// 建一个 WS_POPUP 隐藏窗口来接收 TaskbarCreated; 必须在泵线程上调用
pub(crate) fn create_pump_window(title: &str, create_param: *const c_void) -> Result<HWND> {
    taskbar_created_message();
    let class_name = wide(CLASS_NAME);
    let title = wide(title);
    let wnd = unsafe {
        CreateWindowExW(
            0,
            class_name.as_ptr(),
            title.as_ptr(),
            WS_POPUP,
            0,
            0,
            0,
            0,
            0,
            0,
            GetModuleHandleW(std::ptr::null()),
            create_param,
        )
    };
    if wnd == 0 {
        return Err(last_os_error());
    }
    Ok(wnd)
}

/// 标准消息循环, 直到 WM_QUIT
pub(crate) fn run_message_loop() {
    unsafe {
        let mut msg: MSG = mem::zeroed();
        loop {
            let rv = GetMessageW(&mut msg, 0, 0, 0);
            if rv <= 0 {
                break;
            }
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

pub(crate) fn post_message(wnd: HWND, msg: u32) {
    unsafe {
        PostMessageW(wnd, msg, 0, 0);
    }
}

pub(crate) fn destroy_window(wnd: HWND) {
    unsafe {
        DestroyWindow(wnd);
    }
}

pub(crate) fn post_quit_message() {
    unsafe { PostQuitMessage(0) }
}

pub(crate) fn shell_notify_icon(message: u32, data: &NOTIFYICONDATAW) -> Result<()> {
    if unsafe { Shell_NotifyIconW(message, data) } == 0 {
        return Err(last_os_error());
    }
    Ok(())
}

/// GUID 文本解析, 接受 32 位裸 hex、短横线分隔与花括号包裹三种写法
pub(crate) fn parse_guid(s: &str) -> Result<GUID> {
    let bare = if s.starts_with('{') {
        s.strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or(Error::Guid)?
    } else {
        s
    };
    let hex32: String = if bare.len() == 32 {
        bare.to_owned()
    } else {
        let parts: Vec<&str> = bare.split('-').collect();
        if parts.len() != 5
            || parts[0].len() != 8
            || parts[1].len() != 4
            || parts[2].len() != 4
            || parts[3].len() != 4
            || parts[4].len() != 12
        {
            return Err(Error::Guid);
        }
        parts.concat()
    };
    let bytes = hex::decode(&hex32).map_err(|_| Error::Guid)?;
    if bytes.len() != 16 {
        return Err(Error::Guid);
    }
    let mut data4 = [0u8; 8];
    data4.copy_from_slice(&bytes[8..]);
    Ok(GUID {
        data1: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        data2: u16::from_be_bytes([bytes[4], bytes[5]]),
        data3: u16::from_be_bytes([bytes[6], bytes[7]]),
        data4,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_guid_forms() {
        for s in [
            "23977B55104446FAB9DA2AFD52CE9F2F",
            "23977b55-1044-46fa-b9da-2afd52ce9f2f",
            "{23977B55-1044-46FA-B9DA-2AFD52CE9F2F}",
        ] {
            let guid = parse_guid(s).unwrap();
            assert_eq!(guid.data1, 0x23977B55);
            assert_eq!(guid.data2, 0x1044);
            assert_eq!(guid.data3, 0x46FA);
            assert_eq!(guid.data4[0], 0xB9);
        }
    }

    #[test]
    fn test_parse_guid_rejects() {
        for s in ["", "xyz", "{23977B55-1044-46FA-B9DA}", "23977B55-1044"] {
            assert!(parse_guid(s).is_err());
        }
    }

    #[test]
    fn test_copy_wide_truncates() {
        let mut buf = [0u16; 4];
        copy_wide(&mut buf, "hello");
        assert_eq!(buf, ['h' as u16, 'e' as u16, 'l' as u16, 0]);
    }
}
