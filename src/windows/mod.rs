//! Windows 后端 - 通知区域托盘图标与气泡通知
//!
//! 一个隐藏的 WS_POPUP 窗口跑在专属消息泵线程上, 接收 TaskbarCreated
//! (资源管理器重启后重新挂图标) 与关闭请求; 气泡经 Shell_NotifyIcon
//! 发出, 可用特性按 shell32.dll 版本逐级启用。

mod notifier;
mod sys;

pub use notifier::WinNotifier;

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use windows_sys::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::UI::Shell::NOTIFYICONDATAW;
use windows_sys::Win32::UI::WindowsAndMessaging::{CreateIcon, DestroyIcon, LoadIconW, HICON};

use crate::error::{Error, Result};
use crate::infra::image::{normalize, NormalizedImage};

/// 气泡图标类型, 值与 NIIF_* 对齐
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum IconType {
    #[default]
    None = sys::NIIF_NONE,
    Info = sys::NIIF_INFO,
    Warning = sys::NIIF_WARNING,
    Error = sys::NIIF_ERROR,
    /// 使用随通知携带的图标句柄
    User = sys::NIIF_USER,
}

/// HICON 句柄; 关闭时确定性释放, drop 时尽力而为
#[derive(Clone, Debug)]
pub struct Icon(Arc<IconHandle>);

#[derive(Debug)]
struct IconHandle {
    hicon: HICON,
    owned: bool,
}

// HICON 是可跨线程使用的 shell 句柄
unsafe impl Send for IconHandle {}
unsafe impl Sync for IconHandle {}

impl Drop for IconHandle {
    fn drop(&mut self) {
        if self.owned && self.hicon != 0 {
            unsafe { DestroyIcon(self.hicon) };
        }
    }
}

impl Icon {
    /// 从栅格图像构造 32bpp 图标
    pub fn from_image(img: &image::DynamicImage) -> Result<Icon> {
        let rgba = match normalize(img)? {
            NormalizedImage::Rgba(rgba) => rgba,
            NormalizedImage::Gray(gray) => {
                image::DynamicImage::ImageLuma8(gray).to_rgba8()
            }
        };
        let (w, h) = (rgba.width(), rgba.height());
        // RGBA -> BGRA
        let mut xor: Vec<u8> = rgba.into_raw();
        for px in xor.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
        let and_mask = vec![0u8; ((w as usize + 7) / 8) * h as usize];
        let hicon = unsafe {
            CreateIcon(
                0,
                w as i32,
                h as i32,
                1,
                32,
                and_mask.as_ptr(),
                xor.as_ptr(),
            )
        };
        if hicon == 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        Ok(Icon(Arc::new(IconHandle { hicon, owned: true })))
    }

    /// 从当前模块的资源 ID 加载共享图标
    pub fn from_resource(id: u16) -> Result<Icon> {
        let hicon = unsafe {
            LoadIconW(
                windows_sys::Win32::System::LibraryLoader::GetModuleHandleW(std::ptr::null()),
                id as usize as *const u16,
            )
        };
        if hicon == 0 {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }
        // 共享图标不归我们销毁
        Ok(Icon(Arc::new(IconHandle {
            hicon,
            owned: false,
        })))
    }

    fn handle(&self) -> HICON {
        self.0.hicon
    }
}

/// 一条气泡通知
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon_type: IconType,
    /// `icon_type` 为 `User` 时使用的句柄
    pub icon: Option<Icon>,
    /// false 时静音, 要求 shell >= 6.0.0
    pub sound: bool,
}

impl Default for Notification {
    fn default() -> Notification {
        Notification {
            title: String::new(),
            body: String::new(),
            icon_type: IconType::None,
            icon: None,
            sound: true,
        }
    }
}

/// 泵线程与窗口回调共享的状态
pub(crate) struct PumpState {
    data: Mutex<NOTIFYICONDATAW>,
    added: AtomicBool,
    done: AtomicBool,
    wnd: AtomicIsize,
    err_tx: mpsc::Sender<std::io::Result<()>>,
    taskbar_created: u32,
}

// NOTIFYICONDATAW 只含数值与定长数组
unsafe impl Send for PumpState {}
unsafe impl Sync for PumpState {}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl sys::WindowHandler for PumpState {
    fn handle(&self, wnd: HWND, msg: u32, _wparam: WPARAM, _lparam: LPARAM) -> Option<LRESULT> {
        match msg {
            sys::WM_CLOSE => {
                sys::destroy_window(wnd);
                Some(0)
            }
            sys::WM_DESTROY => {
                let mut result = Ok(());
                if self.added.load(Ordering::SeqCst) {
                    let data = lock(&self.data);
                    if let Err(Error::Io(err)) = sys::shell_notify_icon(sys::NIM_DELETE, &data) {
                        result = Err(err);
                    }
                }
                self.done.store(true, Ordering::SeqCst);
                sys::post_quit_message();
                let _ = self.err_tx.send(result);
                Some(0)
            }
            msg if msg == self.taskbar_created => {
                // 资源管理器重启, 托盘图标需要重挂
                self.added.store(false, Ordering::SeqCst);
                let data = *lock(&self.data);
                if add_icon(self, &data).is_ok() {
                    self.added.store(true, Ordering::SeqCst);
                }
                Some(0)
            }
            _ => None,
        }
    }
}

fn add_icon(state: &PumpState, data: &NOTIFYICONDATAW) -> Result<()> {
    sys::shell_notify_icon(sys::NIM_ADD, data)?;
    if unsafe { data.Anonymous.uVersion } != 0 {
        let _ = sys::shell_notify_icon(sys::NIM_SETVERSION, data);
    }
    state.added.store(true, Ordering::SeqCst);
    Ok(())
}

/// 通知区域里的一个图标
pub struct NotifyIcon {
    /// 图标身份 GUID, 需要 Windows 7+; 三种文本形式见 [`sys`] 的解析器
    pub guid: Option<String>,

    name: String,
    icon: Mutex<Option<Icon>>,
    state: Arc<PumpState>,
    err_rx: Mutex<mpsc::Receiver<std::io::Result<()>>>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl NotifyIcon {
    /// 创建隐藏窗口与消息泵线程; `name` 用作提示文字
    pub fn new(name: &str) -> Result<NotifyIcon> {
        let (err_tx, err_rx) = mpsc::channel();

        let mut data: NOTIFYICONDATAW = unsafe { mem::zeroed() };
        let (v1, v2, v3, v4) = sys::notify_icon_data_sizes();
        // shell32 版本决定结构尺寸与通知版本
        if sys::is_shell_version_or_greater(6, 0, 6) {
            data.cbSize = v4;
            data.uFlags |= sys::NIF_SHOWTIP;
            data.Anonymous.uVersion = sys::NOTIFYICON_VERSION_4;
            data.dwInfoFlags |= sys::NIIF_LARGE_ICON;
            if sys::is_windows7_or_greater() {
                data.dwInfoFlags |= sys::NIIF_RESPECT_QUIET_TIME;
            }
        } else if sys::is_shell_version_or_greater(6, 0, 0) {
            data.cbSize = v3;
            data.Anonymous.uVersion = sys::NOTIFYICON_VERSION;
        } else if sys::is_shell_version_or_greater(5, 0, 0) {
            data.cbSize = v2;
            data.Anonymous.uVersion = sys::NOTIFYICON_VERSION;
        } else {
            data.cbSize = v1;
        }
        data.uFlags |= sys::NIF_TIP;
        sys::copy_wide(&mut data.szTip, name);

        let state = Arc::new(PumpState {
            data: Mutex::new(data),
            added: AtomicBool::new(false),
            done: AtomicBool::new(false),
            wnd: AtomicIsize::new(0),
            err_tx,
            taskbar_created: sys::taskbar_created_message(),
        });

        let pump_state = Arc::clone(&state);
        let title = name.to_owned();
        let thread = std::thread::spawn(move || {
            let param = Arc::as_ptr(&pump_state) as *const std::ffi::c_void;
            match sys::create_pump_window(&title, param) {
                Ok(wnd) => {
                    pump_state.wnd.store(wnd as isize, Ordering::SeqCst);
                    lock(&pump_state.data).hWnd = wnd;
                    let _ = pump_state.err_tx.send(Ok(()));
                    sys::run_message_loop();
                }
                Err(Error::Io(err)) => {
                    let _ = pump_state.err_tx.send(Err(err));
                }
                Err(_) => {
                    let _ = pump_state
                        .err_tx
                        .send(Err(std::io::Error::from(std::io::ErrorKind::Other)));
                }
            }
        });

        let ni = NotifyIcon {
            guid: None,
            name: name.to_owned(),
            icon: Mutex::new(None),
            state,
            err_rx: Mutex::new(err_rx),
            thread: Mutex::new(Some(thread)),
        };
        match lock(&ni.err_rx).recv() {
            Ok(Ok(())) => Ok(ni),
            Ok(Err(err)) => Err(Error::Io(err)),
            Err(_) => Err(Error::Io(std::io::Error::from(
                std::io::ErrorKind::BrokenPipe,
            ))),
        }
    }

    /// 托盘提示文字
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 设置托盘图标, 下次 add/modify 生效
    pub fn set_icon(&self, icon: Option<Icon>) {
        let mut slot = lock(&self.icon);
        let mut data = lock(&self.state.data);
        match &icon {
            Some(icon) => {
                data.uFlags |= sys::NIF_ICON;
                data.hIcon = icon.handle();
            }
            None => {
                data.uFlags &= !sys::NIF_ICON;
                data.hIcon = 0;
            }
        }
        *slot = icon;
    }

    fn prepare(&self, data: &mut NOTIFYICONDATAW) -> Result<()> {
        match &self.guid {
            Some(guid) => {
                if !sys::is_windows7_or_greater() {
                    return Err(Error::WindowsVersion("7"));
                }
                data.guidItem = sys::parse_guid(guid)?;
                data.uFlags |= sys::NIF_GUID;
            }
            None => {
                data.uFlags &= !sys::NIF_GUID;
                data.guidItem = unsafe { mem::zeroed() };
            }
        }
        Ok(())
    }

    /// 把图标挂进通知区域
    pub fn add(&self) -> Result<()> {
        let mut data = lock(&self.state.data);
        self.prepare(&mut data)?;
        add_icon(&self.state, &data)
    }

    /// 原地更新通知区域里的图标
    pub fn modify(&self) -> Result<()> {
        let mut data = lock(&self.state.data);
        self.prepare(&mut data)?;
        sys::shell_notify_icon(sys::NIM_MODIFY, &data)
    }

    /// 显示一条气泡通知; 图标尚未挂载时顺带挂载
    pub fn notify(&self, n: &Notification) -> Result<()> {
        let mut data = {
            let mut data = lock(&self.state.data);
            self.prepare(&mut data)?;
            *data
        };

        data.uFlags |= sys::NIF_INFO;
        sys::copy_wide(&mut data.szInfoTitle, &n.title);
        sys::copy_wide(&mut data.szInfo, &n.body);
        data.dwInfoFlags |= n.icon_type as u32;
        if n.icon_type == IconType::User {
            if let Some(icon) = &n.icon {
                data.hBalloonIcon = icon.handle();
            }
        }
        if !n.sound {
            if !sys::is_shell_version_or_greater(6, 0, 0) {
                return Err(Error::WindowsVersion("XP"));
            }
            data.dwInfoFlags |= sys::NIIF_NOSOUND;
        }

        if !self.state.added.load(Ordering::SeqCst) {
            add_icon(&self.state, &data)
        } else {
            sys::shell_notify_icon(sys::NIM_MODIFY, &data)
        }
    }

    /// 摘掉托盘图标并停掉消息泵; 可重复调用
    pub fn close(&self) -> Result<()> {
        if self.state.done.load(Ordering::SeqCst) {
            return Ok(());
        }
        let wnd = self.state.wnd.load(Ordering::SeqCst);
        if wnd == 0 {
            // 泵线程未能启动, 没有窗口可关
            return Ok(());
        }
        sys::post_message(wnd as HWND, sys::WM_CLOSE);
        let result = lock(&self.err_rx)
            .recv()
            .unwrap_or_else(|_| Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe)));
        if let Some(thread) = lock(&self.thread).take() {
            let _ = thread.join();
        }
        // 图标句柄随通知区域一起确定性释放
        lock(&self.icon).take();
        result.map_err(Error::Io)
    }
}

impl Drop for NotifyIcon {
    fn drop(&mut self) {
        // 尽力而为; 正常路径应当已显式 close
        let _ = self.close();
    }
}
