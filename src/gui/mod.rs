//! Displaying frames in a window and reading keyboard input.
//!
//! Most platforms require the windowing event loop to run on the main thread, so [`run`] takes
//! over the main thread and runs the application code on a spawned thread. [`Window`]s created
//! on that thread talk to the event loop through channels.

mod gpu;
mod renderer;

use std::{
    collections::{HashMap, HashSet},
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::Mutex,
    thread,
    time::Duration,
};

use anyhow::anyhow;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use once_cell::sync::OnceCell;
use winit::{
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget},
    window::WindowId,
};

use crate::{
    error::DisplayError,
    image::{Frame, Resolution},
};

use self::{
    gpu::Gpu,
    renderer::{NativeWindow, Renderer},
};

/// Something frames can be shown on, and that reports user input.
pub trait DisplaySurface {
    /// Shows `frame`, replacing the previously shown one.
    fn show(&mut self, frame: &Frame) -> Result<(), DisplayError>;

    /// Waits up to `timeout` for the next input event.
    ///
    /// Returns `Ok(None)` if nothing happened in time.
    fn poll_event(&mut self, timeout: Duration) -> Result<Option<UiEvent>, DisplayError>;
}

impl<D: DisplaySurface + ?Sized> DisplaySurface for Box<D> {
    fn show(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        (**self).show(frame)
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<UiEvent>, DisplayError> {
        (**self).poll_event(timeout)
    }
}

/// User input reported by a [`DisplaySurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    /// A character was typed.
    Key(char),
    /// The user asked to close the window.
    Closed,
}

/// What the event loop reports back to a [`Window`].
#[derive(Debug)]
enum Notice {
    Event(UiEvent),
    Failed(String),
}

#[derive(Debug)]
enum Msg {
    Subscribe {
        key: String,
        notices: Sender<Notice>,
    },
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

struct Gui {
    gpu: Option<Rc<Gpu>>,
    windows: HashMap<String, Renderer>,
    subscribers: HashMap<String, Sender<Notice>>,
    win_id_to_key: HashMap<WindowId, String>,
    /// Windows closed by the user. Images still in flight for them are dropped.
    closed: HashSet<String>,
}

impl Gui {
    fn new() -> Self {
        Self {
            gpu: None,
            windows: HashMap::new(),
            subscribers: HashMap::new(),
            win_id_to_key: HashMap::new(),
            closed: HashSet::new(),
        }
    }

    fn subscribe(&mut self, key: String, notices: Sender<Notice>) {
        // A window opened again under the same title starts out visible.
        self.closed.remove(&key);
        self.subscribers.insert(key, notices);
    }

    fn close(&mut self, key: &str) {
        log::debug!("window '{key}' closed by user");
        self.windows.remove(key);
        self.win_id_to_key.retain(|_, k| k.as_str() != key);
        self.closed.insert(key.to_string());
        self.notify(key, Notice::Event(UiEvent::Closed));
    }

    fn accepts_images(&self, key: &str) -> bool {
        !self.closed.contains(key)
    }

    fn notify(&self, key: &str, notice: Notice) {
        if let Some(tx) = self.subscribers.get(key) {
            // The window may already have been dropped on the application side.
            tx.send(notice).ok();
        }
    }

    fn gpu(&mut self) -> anyhow::Result<Rc<Gpu>> {
        if let Some(gpu) = &self.gpu {
            return Ok(gpu.clone());
        }
        let gpu = Rc::new(pollster::block_on(Gpu::open())?);
        self.gpu = Some(gpu.clone());
        Ok(gpu)
    }

    fn show_image(
        &mut self,
        target: &EventLoopWindowTarget<Msg>,
        key: String,
        res: Resolution,
        data: Vec<u8>,
    ) -> anyhow::Result<()> {
        if !self.accepts_images(&key) {
            log::trace!("dropping image for closed window '{key}'");
            return Ok(());
        }
        if !self.windows.contains_key(&key) {
            log::debug!("creating window '{key}' at {res}");

            let win = NativeWindow::open(target, &key, res)?;
            let win_id = win.win.id();
            let renderer = Renderer::new(win, self.gpu()?)?;
            self.win_id_to_key.insert(win_id, key.clone());
            self.windows.insert(key.clone(), renderer);
        }

        if let Some(renderer) = self.windows.get_mut(&key) {
            renderer.update_texture(res, &data);
            renderer.window().request_redraw();
        }
        Ok(())
    }

    fn window_event(&mut self, window_id: WindowId, event: WindowEvent<'_>) {
        let Some(key) = self.win_id_to_key.get(&window_id).cloned() else {
            return;
        };
        match event {
            WindowEvent::ReceivedCharacter(ch) => {
                self.notify(&key, Notice::Event(UiEvent::Key(ch)));
            }
            WindowEvent::CloseRequested => self.close(&key),
            _ => {}
        }
    }

    fn redraw(&mut self, window_id: WindowId) {
        let Some(key) = self.win_id_to_key.get(&window_id).cloned() else {
            return;
        };
        let Some(renderer) = self.windows.get_mut(&key) else {
            return;
        };
        if let Err(e) = renderer.redraw() {
            log::error!("failed to redraw window '{key}': {e:#}");
            self.notify(&key, Notice::Failed(format!("{e:#}")));
        }
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            match event {
                Event::UserEvent(Msg::Subscribe { key, notices }) => {
                    self.subscribe(key, notices);
                }
                Event::UserEvent(Msg::Image { key, res, data }) => {
                    if let Err(e) = self.show_image(target, key.clone(), res, data) {
                        log::error!("failed to show image in window '{key}': {e:#}");
                        self.notify(&key, Notice::Failed(format!("{e:#}")));
                    }
                }
                Event::WindowEvent { window_id, event } => self.window_event(window_id, event),
                Event::RedrawRequested(window_id) => self.redraw(window_id),
                _ => {}
            }
        });
    }
}

struct Display {
    proxy: Mutex<EventLoopProxy<Msg>>,
}

static DISPLAY: OnceCell<Display> = OnceCell::new();

fn send(msg: Msg) -> Result<(), DisplayError> {
    let display = DISPLAY.get().ok_or(DisplayError::Unavailable)?;
    display
        .proxy
        .lock()
        .unwrap()
        .send_event(msg)
        .map_err(|_closed| DisplayError::Closed)
}

/// Runs the windowing event loop on the calling thread and `app` on a new thread.
///
/// This must be called from the main thread. It never returns: once `app` finishes, the process
/// exits with status 0 if it returned `Ok`, and prints the error and exits with status 1
/// otherwise. A panic in `app` exits with status 101.
pub fn run<F>(app: F) -> !
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    let display = Display {
        proxy: Mutex::new(event_loop.create_proxy()),
    };
    if DISPLAY.set(display).is_err() {
        log::error!("`gui::run` called more than once");
        process::exit(1);
    }

    let spawned = thread::Builder::new().name("app".into()).spawn(move || {
        match catch_unwind(AssertUnwindSafe(app)) {
            Ok(Ok(())) => process::exit(0),
            Ok(Err(e)) => {
                eprintln!("Error: {e:?}");
                process::exit(1);
            }
            // The panic hook has already printed the message.
            Err(_payload) => process::exit(101),
        }
    });
    if let Err(e) = spawned {
        eprintln!("Error: failed to spawn application thread: {e}");
        process::exit(1);
    }

    Gui::new().run(event_loop);
}

/// A named window showing [`Frame`]s.
///
/// The native window is created when the first frame is shown, at that frame's resolution.
/// Requires [`run`] to be active.
pub struct Window {
    title: String,
    notices: Receiver<Notice>,
    closed: bool,
}

impl Window {
    /// Connects to the event loop started by [`run`].
    ///
    /// Returns [`DisplayError::Unavailable`] if there is no event loop.
    pub fn open(title: impl Into<String>) -> Result<Self, DisplayError> {
        let title = title.into();
        let (tx, rx) = crossbeam_channel::unbounded();
        send(Msg::Subscribe {
            key: title.clone(),
            notices: tx,
        })?;
        Ok(Self {
            title,
            notices: rx,
            closed: false,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }
}

impl DisplaySurface for Window {
    fn show(&mut self, frame: &Frame) -> Result<(), DisplayError> {
        if self.closed {
            return Err(DisplayError::Closed);
        }
        // Frame data is RGBA8 already, so no conversion before GPU upload is needed.
        send(Msg::Image {
            key: self.title.clone(),
            res: frame.resolution(),
            data: frame.data().to_vec(),
        })
    }

    fn poll_event(&mut self, timeout: Duration) -> Result<Option<UiEvent>, DisplayError> {
        if self.closed {
            return Ok(Some(UiEvent::Closed));
        }
        match self.notices.recv_timeout(timeout) {
            Ok(Notice::Event(event)) => {
                if event == UiEvent::Closed {
                    self.closed = true;
                }
                Ok(Some(event))
            }
            Ok(Notice::Failed(msg)) => Err(DisplayError::Graphics(anyhow!(msg))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(DisplayError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_without_event_loop() {
        assert!(matches!(
            Window::open("test"),
            Err(DisplayError::Unavailable)
        ));
    }

    #[test]
    fn closed_window_stays_closed() {
        let mut gui = Gui::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        gui.subscribe("feed".into(), tx);
        assert!(gui.accepts_images("feed"));

        gui.close("feed");
        assert!(matches!(
            rx.try_recv(),
            Ok(Notice::Event(UiEvent::Closed))
        ));
        assert!(!gui.accepts_images("feed"));
        assert!(gui.accepts_images("other"));

        // Opening a window with the same title again shows images again.
        let (tx, _rx) = crossbeam_channel::unbounded();
        gui.subscribe("feed".into(), tx);
        assert!(gui.accepts_images("feed"));
    }
}
