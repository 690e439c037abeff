//! V4L2 webcam access.
//!
//! Currently, only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are
//! supported.

use std::{cmp::Reverse, env};

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::{
    error::CaptureError,
    image::{Frame, Resolution},
    timer::Timer,
};

use super::FrameSource;

/// Indicates whether to prefer a higher resolution or frame rate.
///
/// By default, [`ParamPreference::Resolution`] is used, selecting the maximum resolution at the
/// desired frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    #[default]
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    Framerate,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Device selection and format negotiation options.
#[derive(Debug, Default)]
pub struct WebcamOptions {
    index: usize,
    name: Option<String>,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Selects the webcam by its position among all supported capture devices.
    ///
    /// Defaults to 0, the first supported device.
    #[inline]
    pub fn index(self, index: usize) -> Self {
        Self { index, ..self }
    }

    /// Sets the name of the webcam device to open, taking precedence over the index.
    ///
    /// If no webcam with the given name can be found, opening the webcam will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver the desired resolution.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    ///
    /// A lower frame rate might be selected if the webcam cannot deliver the desired frame rate.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects whether to prefer a higher resolution or frame rate.
    ///
    /// When the camera cannot deliver the desired frame rate or resolution, this parameter controls
    /// which one will be maintained.
    #[inline]
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

fn negotiate_format(device: &Device, mut prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    loop {
        if let Some(fmt) = pick_format(&formats, prefs) {
            return Ok((
                PixFormat::new(
                    fmt.resolution.width(),
                    fmt.resolution.height(),
                    pixel_format,
                ),
                fmt.frame_interval,
            ));
        }

        log::debug!("failed to negotiate format with prefs {:?}", prefs);
        if !prefs.relax() {
            break;
        }
        log::debug!("retrying with new prefs {:?}", prefs);
    }

    bail!("failed to negotiate a webcam format")
}

impl FramePrefs {
    /// Drops the least important constraint. Returns `false` if there was none left.
    fn relax(&mut self) -> bool {
        match self.pref {
            ParamPreference::Resolution => {
                self.fps.take().is_some() || self.resolution.take().is_some()
            }
            ParamPreference::Framerate => {
                self.resolution.take().is_some() || self.fps.take().is_some()
            }
        }
    }
}

fn pick_format(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
    let mut eligible = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| {
                fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
            }) && prefs.fps.map_or(true, |fps| {
                (1.0 / fmt.frame_interval.as_f32()).round() >= fps as f32
            })
        })
        .copied()
        .collect::<Vec<_>>();
    match prefs.pref {
        ParamPreference::Resolution => {
            eligible.sort_by_key(|fmt| (fmt.resolution.num_pixels(), Reverse(fmt.frame_interval)))
        }
        ParamPreference::Framerate => {
            eligible.sort_by_key(|fmt| (Reverse(fmt.frame_interval), fmt.resolution.num_pixels()))
        }
    }
    eligible.last().copied()
}

/// A webcam yielding a stream of [`Frame`]s.
///
/// The device is closed when the [`Webcam`] is dropped.
pub struct Webcam {
    stream: ReadStream,
    width: u32,
    height: u32,
    t_dequeue: Timer,
    t_decode: Timer,
}

const ENV_VAR_WEBCAM_NAME: &str = "HANDCAM_WEBCAM_NAME";

impl Webcam {
    /// Opens the webcam selected by `options`.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        let name_from_env = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = &name_from_env {
            log::debug!(
                "webcam override: `{}` is set to '{}'",
                ENV_VAR_WEBCAM_NAME,
                name,
            );
        }
        let name = options.name.as_deref().or(name_from_env.as_deref());

        let mut supported = 0;
        for res in linuxvideo::list()? {
            let dev = match res {
                Ok(dev) => dev,
                Err(e) => {
                    log::warn!("{}", e);
                    continue;
                }
            };
            match Self::open_impl(dev, name, &options, &mut supported) {
                Ok(Some(webcam)) => return Ok(webcam),
                Ok(None) => {}
                Err(e) => log::debug!("{}", e),
            }
        }

        match name {
            Some(name) => bail!("no supported webcam named '{name}' found"),
            None => bail!(
                "no supported webcam with index {} found ({} supported devices)",
                options.index,
                supported,
            ),
        }
    }

    fn open_impl(
        dev: Device,
        name: Option<&str>,
        options: &WebcamOptions,
        supported: &mut usize,
    ) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if let Some(name) = name {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, fract) = negotiate_format(&dev, options.frame)?;

        // Only devices we can actually use count towards the index.
        let index = *supported;
        *supported += 1;
        if name.is_none() && index != options.index {
            return Ok(None);
        }

        let capture = dev.video_capture(pixfmt)?;

        let format = capture.format();
        let width = format.width();
        let height = format.height();

        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {}x{} @ {:.1}Hz",
            caps.card(),
            path.display(),
            width,
            height,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream()?;

        Ok(Some(Self {
            stream,
            width,
            height,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Returns the resolution negotiated with the device.
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is.
    pub fn read(&mut self) -> Result<Frame, CaptureError> {
        let dequeue_guard = self.t_dequeue.start();
        let (width, height) = (self.width, self.height);
        let t_decode = &self.t_decode;
        self.stream
            .dequeue(|buf| {
                drop(dequeue_guard);
                let frame = match t_decode.time(|| Frame::decode_jpeg(&buf)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        // USB webcams produce the occasional corrupted MJPG frame. A blank frame
                        // keeps the frame rate steady; the next frame is usually fine again.
                        log::error!("webcam decode error: {}", e);
                        Frame::new(width, height)
                    }
                };
                Ok(frame)
            })
            .map_err(CaptureError::Device)
    }
}

impl FrameSource for Webcam {
    fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        self.read()
    }

    /// Returns the dequeue and decode timers.
    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

impl Drop for Webcam {
    fn drop(&mut self) {
        log::debug!("closing webcam ({}x{})", self.width, self.height);
    }
}

impl IntoIterator for Webcam {
    type Item = Result<Frame, CaptureError>;
    type IntoIter = IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { webcam: self }
    }
}

/// An owned, endless iterator over the frames captured by a [`Webcam`].
pub struct IntoIter {
    webcam: Webcam,
}

impl Iterator for IntoIter {
    type Item = Result<Frame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.webcam.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(width: u32, height: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(width, height),
            frame_interval: Fract::new(1, fps),
        }
    }

    fn formats() -> Vec<FrameFormat> {
        vec![
            fmt(640, 480, 30),
            fmt(640, 480, 60),
            fmt(1280, 720, 30),
            fmt(1920, 1080, 15),
        ]
    }

    #[test]
    fn prefers_resolution() {
        let prefs = FramePrefs {
            fps: Some(30),
            ..Default::default()
        };
        let picked = pick_format(&formats(), prefs).unwrap();
        assert_eq!(picked.resolution, Resolution::RES_720P);
    }

    #[test]
    fn prefers_framerate() {
        let prefs = FramePrefs {
            pref: ParamPreference::Framerate,
            ..Default::default()
        };
        let picked = pick_format(&formats(), prefs).unwrap();
        assert_eq!(picked.resolution, Resolution::RES_480P);
        assert_eq!(picked.frame_interval, Fract::new(1, 60));
    }

    #[test]
    fn relaxes_unsatisfiable_prefs() {
        let mut prefs = FramePrefs {
            resolution: Some(Resolution::new(3840, 2160)),
            fps: Some(120),
            pref: ParamPreference::Resolution,
        };
        assert!(pick_format(&formats(), prefs).is_none());
        assert!(prefs.relax());
        assert_eq!(prefs.fps, None);
        assert!(pick_format(&formats(), prefs).is_none());
        assert!(prefs.relax());
        assert!(pick_format(&formats(), prefs).is_some());
        assert!(!prefs.relax());
    }
}
