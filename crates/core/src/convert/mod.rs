//! Conversion of one ILDA animation into one WAV file.
//!
//! [`convert_stream`] and [`convert_file`] run synchronously and report
//! progress through a callback. [`spawn`] runs a conversion on its own worker
//! thread and hands back an ordered stream of [`ConversionEvent`]s.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    ops::ControlFlow,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, SyncSender},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crate::{
    synth::{repeat_count, FrameSynthesizer, BYTES_PER_SAMPLE},
    wav::{write_wav, WavSpec, MAX_DATA_LEN},
    Animation, ChannelLayout, Ilda2WavError, Result,
};

/// Capacity of the event channel between a worker and its consumer.
pub const EVENT_CAPACITY: usize = 8;

/// Rates and channel layout for a conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionParams {
    frame_rate: u32,
    point_rate: u32,
    layout: ChannelLayout,
}

impl ConversionParams {
    /// Both rates must be positive.
    pub fn new(frame_rate: u32, point_rate: u32, layout: ChannelLayout) -> Result<Self> {
        if frame_rate == 0 {
            return Err(Ilda2WavError::InvalidRequest(
                "frame rate must be positive".into(),
            ));
        }
        if point_rate == 0 {
            return Err(Ilda2WavError::InvalidRequest(
                "point rate must be positive".into(),
            ));
        }
        Ok(Self {
            frame_rate,
            point_rate,
            layout,
        })
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn point_rate(&self) -> u32 {
        self.point_rate
    }

    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    /// Output format: one channel per descriptor, sampled at the point rate.
    pub fn wav_spec(&self) -> WavSpec {
        WavSpec::new(self.layout.channel_count(), self.point_rate)
    }
}

/// A conversion of `input` into the WAV file at `output`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub params: ConversionParams,
}

/// Statistics about a finished conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionSummary {
    pub frames: usize,
    /// Frames that produced no audio because they were empty or did not fit
    /// the rate budget even once.
    pub skipped_frames: usize,
    /// Length of the PCM payload in bytes.
    pub data_len: usize,
}

/// How a synchronous conversion ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed(ConversionSummary),
    /// The progress callback asked to stop; nothing was written.
    Cancelled,
}

/// Renders every frame of `animation` into one PCM buffer.
///
/// `on_progress` receives `100 * frames_done / total` after each frame.
/// Returns `Ok(None)` when the callback breaks. Fails with
/// [`Ilda2WavError::InvalidRequest`] before synthesizing a frame that would
/// push the payload past what a WAV container can hold.
pub fn render_pcm<F>(
    animation: &Animation,
    params: &ConversionParams,
    mut on_progress: F,
) -> Result<Option<(Vec<u8>, ConversionSummary)>>
where
    F: FnMut(u8) -> ControlFlow<()>,
{
    let total = animation.len();
    let mut synth = FrameSynthesizer::new();
    let mut pcm = Vec::new();
    let mut summary = ConversionSummary {
        frames: total,
        ..Default::default()
    };

    for (i, frame) in animation.frames().iter().enumerate() {
        let repeat = repeat_count(params.point_rate, params.frame_rate, frame.points().len());
        if repeat == 0 {
            summary.skipped_frames += 1;
        }

        let channels = usize::from(params.layout.channel_count());
        let block_len = frame.points().len() * channels * BYTES_PER_SAMPLE;
        let total_len = block_len
            .checked_mul(repeat as usize)
            .and_then(|len| len.checked_add(pcm.len()))
            .filter(|len| *len <= MAX_DATA_LEN as usize)
            .ok_or_else(|| {
                Ilda2WavError::InvalidRequest(format!(
                    "frame {} would grow the audio past {MAX_DATA_LEN} bytes",
                    i + 1
                ))
            })?;
        pcm.reserve(total_len - pcm.len());

        pcm.extend_from_slice(synth.synthesize(frame, &params.layout, repeat));
        tracing::trace!(frame = i, points = frame.points().len(), repeat, "synthesized frame");

        let percent = (100 * (i + 1) / total) as u8;
        if on_progress(percent).is_break() {
            return Ok(None);
        }
    }

    if summary.skipped_frames > 0 {
        tracing::warn!(
            skipped = summary.skipped_frames,
            frames = total,
            "frames with too many points for the requested rates were dropped"
        );
    }

    summary.data_len = pcm.len();
    Ok(Some((pcm, summary)))
}

/// Decodes `reader`, renders it and writes the WAV container to `writer`.
pub fn convert_stream<R, W, F>(
    reader: R,
    writer: W,
    params: &ConversionParams,
    on_progress: F,
) -> Result<Outcome>
where
    R: Read,
    W: Write,
    F: FnMut(u8) -> ControlFlow<()>,
{
    convert_with(reader, params, on_progress, || Ok(Some(writer)))
}

/// File-based conversion. The output file is created only once every frame
/// has been rendered, so a cancelled conversion leaves no file behind.
pub fn convert_file<F>(request: &ConversionRequest, on_progress: F) -> Result<Outcome>
where
    F: FnMut(u8) -> ControlFlow<()>,
{
    convert_request(request, on_progress, || true)
}

/// Like [`convert_file`], but asks `may_write` once more right before the
/// output file would be created.
fn convert_request<F, P>(
    request: &ConversionRequest,
    on_progress: F,
    may_write: P,
) -> Result<Outcome>
where
    F: FnMut(u8) -> ControlFlow<()>,
    P: FnOnce() -> bool,
{
    tracing::info!(input = ?request.input, output = ?request.output, "converting");

    let input = File::open(&request.input)?;
    let outcome = convert_with(BufReader::new(input), &request.params, on_progress, || {
        if !may_write() {
            return Ok(None);
        }
        let output = File::create(&request.output)?;
        Ok(Some(BufWriter::new(output)))
    })?;

    match outcome {
        Outcome::Completed(summary) => tracing::info!(
            output = ?request.output,
            frames = summary.frames,
            bytes = summary.data_len,
            "conversion finished"
        ),
        Outcome::Cancelled => tracing::debug!(input = ?request.input, "conversion cancelled"),
    }
    Ok(outcome)
}

/// Decode, render, then open the sink and write the container. `open_output`
/// runs only after every frame is rendered; returning `None` cancels.
fn convert_with<R, W, F, O>(
    reader: R,
    params: &ConversionParams,
    on_progress: F,
    open_output: O,
) -> Result<Outcome>
where
    R: Read,
    W: Write,
    F: FnMut(u8) -> ControlFlow<()>,
    O: FnOnce() -> Result<Option<W>>,
{
    let animation = Animation::read_from(reader)?;
    tracing::debug!(frames = animation.len(), "decoded animation");

    let Some((pcm, summary)) = render_pcm(&animation, params, on_progress)? else {
        return Ok(Outcome::Cancelled);
    };
    let Some(writer) = open_output()? else {
        return Ok(Outcome::Cancelled);
    };

    write_wav(writer, &pcm, params.wav_spec())?;
    Ok(Outcome::Completed(summary))
}

/// Event emitted by a conversion worker.
#[derive(Debug)]
pub enum ConversionEvent {
    /// Percentage of work done; `100` arrives only after the file is written.
    Progress(u8),
    /// Terminal failure. No events follow.
    Failure(Ilda2WavError),
}

/// Starts `request` on a dedicated worker thread.
pub fn spawn(request: ConversionRequest) -> Result<ConversionEvents> {
    let (tx, rx) = mpsc::sync_channel(EVENT_CAPACITY);
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let name = request
        .input
        .file_name()
        .map(|n| format!("ilda2wav:{}", n.to_string_lossy()))
        .unwrap_or_else(|| "ilda2wav".to_string());

    let worker = thread::Builder::new()
        .name(name)
        .spawn(move || run_worker(request, tx, flag))?;

    Ok(ConversionEvents {
        events: rx,
        cancelled,
        worker: Some(worker),
    })
}

fn run_worker(
    request: ConversionRequest,
    events: SyncSender<ConversionEvent>,
    cancelled: Arc<AtomicBool>,
) {
    let on_progress = |percent: u8| {
        if cancelled.load(Ordering::Acquire) {
            return ControlFlow::Break(());
        }
        // The final percentage is held back until the container is on disk.
        if percent >= 100 {
            return ControlFlow::Continue(());
        }
        match events.send(ConversionEvent::Progress(percent)) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    };
    let result = convert_request(&request, on_progress, || !cancelled.load(Ordering::Acquire));

    match result {
        Ok(Outcome::Completed(_)) => {
            let _ = events.send(ConversionEvent::Progress(100));
        }
        Ok(Outcome::Cancelled) => {}
        Err(err) => {
            tracing::warn!(input = ?request.input, error = %err, "conversion failed");
            let _ = events.send(ConversionEvent::Failure(err));
        }
    }
}

/// Ordered event stream of a running conversion.
///
/// Dropping the stream cancels the conversion: the worker stops at its next
/// frame, or right before creating the output file, and writes nothing.
#[derive(Debug)]
pub struct ConversionEvents {
    events: Receiver<ConversionEvent>,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ConversionEvents {
    /// Cancels the conversion and waits for the worker to exit.
    pub fn cancel(mut self) -> Result<()> {
        self.cancelled.store(true, Ordering::Release);
        // Keep draining so a worker blocked on a full channel can observe the flag.
        while self.events.recv().is_ok() {}
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| Ilda2WavError::msg("conversion worker panicked")),
            None => Ok(()),
        }
    }
}

impl Drop for ConversionEvents {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl Iterator for ConversionEvents {
    type Item = ConversionEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.events.recv() {
            Ok(event) => Some(event),
            Err(_) => {
                let worker = self.worker.take()?;
                worker.join().err().map(|_| {
                    ConversionEvent::Failure(Ilda2WavError::msg("conversion worker panicked"))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Frame, Header, Point, Status, TableType};

    fn params(frame_rate: u32, point_rate: u32, layout: &str) -> ConversionParams {
        ConversionParams::new(frame_rate, point_rate, layout.parse().unwrap()).unwrap()
    }

    fn animation(frames: usize, points: usize) -> Animation {
        let frames = (0..frames)
            .map(|i| {
                let header = Header {
                    table_type: TableType::Points3D,
                    info: format!("f{i}"),
                    length: 0,
                    index: i as u16 + 1,
                    total: frames as u16,
                    head: 0,
                };
                let points = (0..points)
                    .map(|p| Point {
                        x: p as i16,
                        y: -(p as i16),
                        z: 0,
                        status: Status(if p % 2 == 0 { 0x4000 } else { 0 }),
                    })
                    .collect();
                Frame::new(header, points).unwrap()
            })
            .collect();
        Animation::new(frames)
    }

    fn encode(animation: &Animation) -> Vec<u8> {
        let mut bytes = Vec::new();
        animation.write_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn rejects_non_positive_rates() {
        let layout: ChannelLayout = "X|Y".parse().unwrap();
        assert!(ConversionParams::new(0, 20_000, layout.clone()).is_err());
        assert!(matches!(
            ConversionParams::new(15, 0, layout),
            Err(Ilda2WavError::InvalidRequest(_))
        ));
    }

    #[test]
    fn converts_stream_and_reports_monotonic_progress() {
        let input = encode(&animation(4, 100));
        let mut out = Vec::new();
        let mut seen = Vec::new();

        let params = params(15, 20_000, "Y|-1X|B|C");
        let outcome = convert_stream(input.as_slice(), &mut out, &params, |p| {
            seen.push(p);
            ControlFlow::Continue(())
        })
        .unwrap();

        assert_eq!(seen, vec![25, 50, 75, 100]);
        let expected_data = 4 * 100 * 4 * 13 * 2;
        assert_eq!(
            outcome,
            Outcome::Completed(ConversionSummary {
                frames: 4,
                skipped_frames: 0,
                data_len: expected_data,
            })
        );
        assert_eq!(out.len(), crate::wav::HEADER_LEN + expected_data);
    }

    #[test]
    fn frames_over_the_rate_budget_are_skipped() {
        let input = encode(&animation(2, 2000));
        let mut out = Vec::new();
        let outcome = convert_stream(input.as_slice(), &mut out, &params(15, 20_000, "X|Y"), |_| {
            ControlFlow::Continue(())
        })
        .unwrap();

        let Outcome::Completed(summary) = outcome else {
            panic!("conversion should complete");
        };
        assert_eq!(summary.skipped_frames, 2);
        assert_eq!(summary.data_len, 0);
        assert_eq!(out.len(), crate::wav::HEADER_LEN);
    }

    #[test]
    fn callback_can_cancel_before_anything_is_written() {
        let input = encode(&animation(5, 10));
        let mut out = Vec::new();
        let outcome = convert_stream(input.as_slice(), &mut out, &params(15, 20_000, "X|Y"), |p| {
            if p >= 40 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();

        assert_eq!(outcome, Outcome::Cancelled);
        assert!(out.is_empty());
    }

    #[test]
    fn decode_errors_propagate() {
        let mut out = Vec::new();
        let err = convert_stream(&b"ILDX"[..], &mut out, &params(15, 20_000, "X|Y"), |_| {
            ControlFlow::Continue(())
        })
        .unwrap_err();
        assert!(matches!(err, Ilda2WavError::CorruptInput(_)));
    }

    #[test]
    fn worker_streams_progress_then_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("anim.ild");
        let output = dir.path().join("anim.wav");
        std::fs::write(&input, encode(&animation(3, 50))).unwrap();

        let events = spawn(ConversionRequest {
            input,
            output: output.clone(),
            params: params(10, 10_000, "X|Y|B|C"),
        })
        .unwrap();

        let percents: Vec<u8> = events
            .map(|event| match event {
                ConversionEvent::Progress(p) => p,
                ConversionEvent::Failure(err) => panic!("unexpected failure: {err}"),
            })
            .collect();
        assert_eq!(percents, vec![33, 66, 100]);

        let written = std::fs::read(&output).unwrap();
        assert_eq!(written.len(), crate::wav::HEADER_LEN + 3 * 50 * 4 * 20 * 2);
    }

    #[test]
    fn worker_reports_a_single_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.ild");
        std::fs::write(&input, b"ILDA\0\0\0\0short").unwrap();

        let events: Vec<_> = spawn(ConversionRequest {
            input,
            output: dir.path().join("broken.wav"),
            params: params(15, 20_000, "X|Y"),
        })
        .unwrap()
        .collect();

        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ConversionEvent::Failure(Ilda2WavError::CorruptInput(_))
        ));
        assert!(!dir.path().join("broken.wav").exists());
    }

    #[test]
    fn missing_input_is_an_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut events = spawn(ConversionRequest {
            input: dir.path().join("nope.ild"),
            output: dir.path().join("nope.wav"),
            params: params(15, 20_000, "X|Y"),
        })
        .unwrap();

        assert!(matches!(
            events.next(),
            Some(ConversionEvent::Failure(Ilda2WavError::Io(_)))
        ));
        assert!(events.next().is_none());
    }

    #[test]
    fn dropping_the_stream_cancels_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("long.ild");
        let output = dir.path().join("long.wav");
        std::fs::write(&input, encode(&animation(4 * EVENT_CAPACITY, 4))).unwrap();

        let events = spawn(ConversionRequest {
            input,
            output: output.clone(),
            params: params(15, 20_000, "X|Y"),
        })
        .unwrap();
        events.cancel().unwrap();

        assert!(!output.exists());
    }

    #[test]
    fn cancelling_a_single_frame_conversion_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("single.ild");
        let output = dir.path().join("single.wav");
        // One large frame keeps the worker busy rendering while we cancel.
        std::fs::write(&input, encode(&animation(1, 20_000))).unwrap();

        let events = spawn(ConversionRequest {
            input,
            output: output.clone(),
            params: params(1, 20_000 * 100, "X|Y"),
        })
        .unwrap();
        events.cancel().unwrap();

        assert!(!output.exists());
    }

    #[test]
    fn write_failure_after_progress_ends_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("anim.ild");
        std::fs::write(&input, encode(&animation(3, 10))).unwrap();

        let events: Vec<_> = spawn(ConversionRequest {
            input,
            output: dir.path().join("missing").join("anim.wav"),
            params: params(15, 20_000, "X|Y"),
        })
        .unwrap()
        .collect();

        assert!(matches!(
            events.as_slice(),
            [
                ConversionEvent::Progress(33),
                ConversionEvent::Progress(66),
                ConversionEvent::Failure(Ilda2WavError::Io(_)),
            ]
        ));
    }

    #[test]
    fn refuses_audio_larger_than_a_wav_container() {
        let input = encode(&animation(1, 1));
        let mut out = Vec::new();
        let mut seen = Vec::new();

        let err = convert_stream(input.as_slice(), &mut out, &params(1, u32::MAX, "X|Y"), |p| {
            seen.push(p);
            ControlFlow::Continue(())
        })
        .unwrap_err();

        assert!(matches!(err, Ilda2WavError::InvalidRequest(_)));
        assert!(seen.is_empty());
        assert!(out.is_empty());
    }

    #[test]
    fn empty_animation_reports_completion_only() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("empty.ild");
        let output = dir.path().join("empty.wav");
        std::fs::write(&input, encode(&Animation::default())).unwrap();

        let events: Vec<_> = spawn(ConversionRequest {
            input,
            output: output.clone(),
            params: params(15, 20_000, "X|Y"),
        })
        .unwrap()
        .collect();

        assert!(matches!(events.as_slice(), [ConversionEvent::Progress(100)]));
        assert_eq!(std::fs::read(&output).unwrap().len(), crate::wav::HEADER_LEN);
    }
}
