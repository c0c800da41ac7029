//! The per-session decode loop.
//!
//! A [`Session`] owns the stream buffer, the synchronizer position and the
//! [`Decoder`], and drives them through a fixed state machine:
//!
//! ```text
//! AwaitingInput -> Synchronizing -> Decoding -> Dispatching -+
//!       ^                                                    |
//!       +----------------------------------------------------+
//! ```
//!
//! with terminal `Finished` and `Aborted` states. The caller participates
//! through the [`Handler`] capabilities; any callback can end the session
//! at the next state boundary, never mid-frame. Exactly one frame is in
//! flight at a time: the Layer III bit reservoir makes frames sequentially
//! dependent, so no reordering or parallel decode is possible within a
//! session.

use std::collections::VecDeque;

use anyhow::Result;
use log::debug;

use crate::process::decode::{Decoder, PcmFrame};
use crate::process::sync::{self, Candidate};
use crate::structs::header::FrameHeader;
use crate::utils::errors::{StreamError, SyncError};

/// Refill threshold: below this many buffered bytes the driver asks the
/// input collaborator for more. Covers the largest legal frame.
const LOW_WATER: usize = 2048;

/// Continue/stop signal returned by the informational callbacks.
///
/// From the error callback, `Continue` means "skip the lost frame and
/// resume"; `Stop` aborts the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Result of an input supply request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStatus {
    /// More data was appended to the buffer.
    Appended,
    /// No further data will ever arrive; drain and finish.
    EndOfStream,
    /// Terminate the session immediately.
    Abort,
}

/// Append-only view of the session buffer handed to the input callback.
pub struct InputBuffer<'a> {
    buffer: &'a mut VecDeque<u8>,
}

impl InputBuffer<'_> {
    /// Adds raw stream data to the session buffer.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// The caller's capability set.
///
/// The implementing type is the session context: every callback receives
/// `&mut self`, so arbitrary caller state threads through the session
/// without the decoder knowing its shape. Input supply and output delivery
/// are mandatory; the header and error hooks default to no-ops that always
/// continue.
pub trait Handler {
    /// Supplies more stream bytes when the buffer runs low.
    fn supply_input(&mut self, buffer: &mut InputBuffer<'_>) -> InputStatus;

    /// Observes the header of every successfully decoded frame before its
    /// samples are delivered. Read-only; returning `Stop` aborts.
    fn header(&mut self, _header: &FrameHeader) -> Flow {
        Flow::Continue
    }

    /// Observes every recoverable error before the session retries.
    /// `header` is present for frame-level (decode) errors.
    fn error(&mut self, _header: Option<&FrameHeader>, _error: &StreamError) -> Flow {
        Flow::Continue
    }

    /// Receives the decoded samples of one frame.
    fn output(&mut self, header: &FrameHeader, pcm: &PcmFrame) -> Flow;
}

/// Session options.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bytes to discard before the first synchronization attempt, e.g. a
    /// leading ID3 tag.
    pub initial_skip_bytes: usize,
    /// Escalate CRC mismatches to frame loss instead of reporting and
    /// decoding anyway.
    pub strict_crc: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_skip_bytes: 0,
            strict_crc: false,
        }
    }
}

/// Driver state; see the module documentation for the transition graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    AwaitingInput,
    Synchronizing,
    Decoding,
    Dispatching,
    Finished,
    Aborted,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The stream ended and every complete frame was processed.
    Finished,
    /// A callback requested termination.
    Aborted,
}

/// One decoding session over one stream.
pub struct Session<H: Handler> {
    handler: H,
    buffer: VecDeque<u8>,
    decoder: Decoder,
    state: State,
    eos: bool,
    skip_remaining: usize,
    pending: Option<Candidate>,
    outgoing: Option<(FrameHeader, PcmFrame)>,
}

impl<H: Handler> Session<H> {
    pub fn new(handler: H) -> Self {
        Self::with_config(handler, SessionConfig::default())
    }

    pub fn with_config(handler: H, config: SessionConfig) -> Self {
        let mut decoder = Decoder::default();
        decoder.set_strict_crc(config.strict_crc);

        Self {
            handler,
            buffer: VecDeque::with_capacity(4 * LOW_WATER),
            decoder,
            state: State::AwaitingInput,
            eos: false,
            skip_remaining: config.initial_skip_bytes,
            pending: None,
            outgoing: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Consumes the session, returning the caller's context.
    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Runs the session to a terminal state.
    ///
    /// Recoverable errors are routed through the error callback and the
    /// loop continues; only an internal invariant violation makes this
    /// return `Err`, after forcing the session into `Aborted`.
    pub fn run(&mut self) -> Result<SessionOutcome> {
        loop {
            match self.state {
                State::AwaitingInput => self.await_input(),
                State::Synchronizing => self.synchronize(),
                State::Decoding => self.decode()?,
                State::Dispatching => self.dispatch(),
                State::Finished => return Ok(SessionOutcome::Finished),
                State::Aborted => return Ok(SessionOutcome::Aborted),
            }
        }
    }

    fn await_input(&mut self) {
        self.consume_initial_skip();

        if !self.eos && self.buffer.len() < LOW_WATER {
            let mut input = InputBuffer {
                buffer: &mut self.buffer,
            };
            match self.handler.supply_input(&mut input) {
                InputStatus::Appended => {}
                InputStatus::EndOfStream => {
                    debug!("Input signalled end of stream");
                    self.eos = true;
                }
                InputStatus::Abort => {
                    self.state = State::Aborted;
                    return;
                }
            }
            self.consume_initial_skip();
        }

        // More skip bytes outstanding than buffered: keep requesting input
        // unless the stream already ended.
        if self.skip_remaining > 0 && !self.eos {
            return;
        }

        self.state = State::Synchronizing;
    }

    fn consume_initial_skip(&mut self) {
        if self.skip_remaining > 0 {
            let n = self.skip_remaining.min(self.buffer.len());
            self.buffer.drain(..n);
            self.skip_remaining -= n;
        }
    }

    fn synchronize(&mut self) {
        match sync::search(&mut self.buffer) {
            Ok(candidate) => {
                self.pending = Some(candidate);
                self.state = State::Decoding;
            }
            Err(e) => {
                let malformed = matches!(e, SyncError::Malformed(_));
                let error: StreamError = e.into();

                if self.handler.error(None, &error) == Flow::Stop {
                    self.state = State::Aborted;
                } else if malformed {
                    // Resynchronize one byte past the rejected position.
                    self.buffer.pop_front();
                } else if self.eos {
                    self.state = State::Finished;
                } else {
                    self.state = State::AwaitingInput;
                }
            }
        }
    }

    fn decode(&mut self) -> Result<()> {
        let Some(candidate) = self.pending.take() else {
            return Err(self.invariant_violation("no pending frame in Decoding"));
        };

        let frame_len = candidate.header.frame_len;
        if self.buffer.len() < frame_len {
            return Err(self.invariant_violation("synchronized frame exceeds buffered data"));
        }

        let result = {
            let frame = self.buffer.make_contiguous();
            self.decoder.decode(&candidate.header, &frame[..frame_len])
        };
        self.buffer.drain(..frame_len);

        match result {
            Ok(decoded) => {
                if let Some(crc_error) = decoded.crc_error {
                    let error = StreamError::Decode(crc_error);
                    if self.handler.error(Some(&candidate.header), &error) == Flow::Stop {
                        self.state = State::Aborted;
                        return Ok(());
                    }
                }

                self.outgoing = Some((candidate.header, decoded.pcm));
                self.state = State::Dispatching;
            }
            Err(e) => {
                let error = StreamError::Decode(e);
                match self.handler.error(Some(&candidate.header), &error) {
                    Flow::Continue => self.state = State::Synchronizing,
                    Flow::Stop => self.state = State::Aborted,
                }
            }
        }

        Ok(())
    }

    fn dispatch(&mut self) {
        let Some((header, pcm)) = self.outgoing.take() else {
            self.state = State::Aborted;
            return;
        };

        if self.handler.header(&header) == Flow::Stop {
            self.state = State::Aborted;
            return;
        }

        if self.handler.output(&header, &pcm) == Flow::Stop {
            self.state = State::Aborted;
            return;
        }

        self.state = State::AwaitingInput;
    }

    fn invariant_violation(&mut self, message: &str) -> anyhow::Error {
        let error = StreamError::InvariantViolation(message.into());
        let _ = self.handler.error(None, &error);
        self.state = State::Aborted;

        anyhow::anyhow!(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::header::{FrameHeader, build_header};

    fn layer1_frame() -> Vec<u8> {
        let word = build_header(3, 3, 1, 1, 2, 0, 3);
        let header = FrameHeader::parse(word).unwrap();
        let mut frame = word.to_be_bytes().to_vec();
        frame.resize(header.frame_len, 0);
        frame
    }

    #[derive(Default)]
    struct TestHandler {
        chunks: VecDeque<Vec<u8>>,
        headers: Vec<FrameHeader>,
        pcm_frames: Vec<(usize, usize)>,
        sync_lost: usize,
        out_of_data: usize,
        decode_errors: usize,
        stop_on_decode_error: bool,
        stop_after_outputs: Option<usize>,
        abort_input: bool,
    }

    impl TestHandler {
        fn with_stream(data: Vec<u8>) -> Self {
            Self {
                chunks: VecDeque::from(vec![data]),
                ..Default::default()
            }
        }
    }

    impl Handler for TestHandler {
        fn supply_input(&mut self, buffer: &mut InputBuffer<'_>) -> InputStatus {
            if self.abort_input {
                return InputStatus::Abort;
            }
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buffer.push_bytes(&chunk);
                    InputStatus::Appended
                }
                None => InputStatus::EndOfStream,
            }
        }

        fn header(&mut self, header: &FrameHeader) -> Flow {
            self.headers.push(*header);
            Flow::Continue
        }

        fn error(&mut self, _header: Option<&FrameHeader>, error: &StreamError) -> Flow {
            match error {
                StreamError::SyncLost => self.sync_lost += 1,
                StreamError::OutOfData => self.out_of_data += 1,
                StreamError::Decode(_) => {
                    self.decode_errors += 1;
                    if self.stop_on_decode_error {
                        return Flow::Stop;
                    }
                }
                _ => {}
            }
            Flow::Continue
        }

        fn output(&mut self, _header: &FrameHeader, pcm: &PcmFrame) -> Flow {
            self.pcm_frames.push((pcm.channel_count, pcm.sample_count));
            if self.stop_after_outputs == Some(self.pcm_frames.len()) {
                return Flow::Stop;
            }
            Flow::Continue
        }
    }

    #[test]
    fn single_frame_then_finished() {
        let mut session = Session::new(TestHandler::with_stream(layer1_frame()));

        let outcome = session.run().unwrap();

        assert_eq!(outcome, SessionOutcome::Finished);
        assert_eq!(session.state(), State::Finished);
        let handler = session.into_handler();
        assert_eq!(handler.pcm_frames, vec![(1, 384)]);
        assert_eq!(handler.headers.len(), 1);
    }

    #[test]
    fn garbage_stream_reports_sync_lost_and_finishes() {
        let mut session = Session::new(TestHandler::with_stream(vec![0x55; 4096]));

        let outcome = session.run().unwrap();

        assert_eq!(outcome, SessionOutcome::Finished);
        let handler = session.into_handler();
        assert!(handler.pcm_frames.is_empty());
        assert!(handler.sync_lost >= 1);
    }

    #[test]
    fn frame_split_across_refills() {
        let frame = layer1_frame();
        let mut handler = TestHandler::default();
        handler.chunks = VecDeque::from(vec![frame[..10].to_vec(), frame[10..].to_vec()]);

        let mut session = Session::new(handler);
        let outcome = session.run().unwrap();

        assert_eq!(outcome, SessionOutcome::Finished);
        let handler = session.into_handler();
        assert_eq!(handler.pcm_frames.len(), 1);
        assert!(handler.out_of_data >= 1);
    }

    #[test]
    fn decode_error_skips_frame_and_continues() {
        let mut bad = layer1_frame();
        bad[4] = 0xF0; // forbidden allocation code 15

        let mut stream = bad;
        stream.extend(layer1_frame());

        let mut session = Session::new(TestHandler::with_stream(stream));
        let outcome = session.run().unwrap();

        assert_eq!(outcome, SessionOutcome::Finished);
        let handler = session.into_handler();
        assert_eq!(handler.decode_errors, 1);
        assert_eq!(handler.pcm_frames.len(), 1);
    }

    #[test]
    fn stop_from_error_callback_aborts() {
        let mut bad = layer1_frame();
        bad[4] = 0xF0;
        let mut stream = bad;
        stream.extend(layer1_frame());

        let mut handler = TestHandler::with_stream(stream);
        handler.stop_on_decode_error = true;

        let mut session = Session::new(handler);
        let outcome = session.run().unwrap();

        assert_eq!(outcome, SessionOutcome::Aborted);
        let handler = session.into_handler();
        assert_eq!(handler.decode_errors, 1);
        assert!(handler.pcm_frames.is_empty());
    }

    #[test]
    fn stop_from_output_callback_aborts() {
        let mut stream = layer1_frame();
        stream.extend(layer1_frame());

        let mut handler = TestHandler::with_stream(stream);
        handler.stop_after_outputs = Some(1);

        let mut session = Session::new(handler);
        let outcome = session.run().unwrap();

        assert_eq!(outcome, SessionOutcome::Aborted);
        assert_eq!(session.handler().pcm_frames.len(), 1);
    }

    #[test]
    fn abort_from_input_callback() {
        let mut handler = TestHandler::with_stream(layer1_frame());
        handler.abort_input = true;

        let mut session = Session::new(handler);
        let outcome = session.run().unwrap();

        assert_eq!(outcome, SessionOutcome::Aborted);
        assert!(session.handler().pcm_frames.is_empty());
    }

    #[test]
    fn initial_skip_jumps_leading_tag() {
        // A fake tag that even contains a sync-like pattern.
        let mut stream = b"ID3\x04\x00\xFF\xFB\x00\x00garbage".to_vec();
        let tag_len = stream.len();
        stream.extend(layer1_frame());

        let config = SessionConfig {
            initial_skip_bytes: tag_len,
            ..Default::default()
        };
        let mut session = Session::with_config(TestHandler::with_stream(stream), config);
        let outcome = session.run().unwrap();

        assert_eq!(outcome, SessionOutcome::Finished);
        assert_eq!(session.handler().pcm_frames.len(), 1);
    }

    #[test]
    fn corruption_in_one_frame_leaves_the_next_header_intact() {
        let mut first = layer1_frame();
        first[24] ^= 0xA5; // flip bits inside the payload
        let clean = layer1_frame();

        let mut stream = first;
        stream.extend(&clean);

        let mut session = Session::new(TestHandler::with_stream(stream));
        session.run().unwrap();

        let handler = session.into_handler();
        assert_eq!(handler.headers.len(), 2);
        assert_eq!(handler.headers[0], handler.headers[1]);
    }

    #[test]
    fn strict_crc_loses_the_frame() {
        // Protected Layer I frame with a bogus checksum.
        let word = build_header(3, 3, 0, 1, 2, 0, 3);
        let header = FrameHeader::parse(word).unwrap();
        let mut frame = word.to_be_bytes().to_vec();
        frame.resize(header.frame_len, 0);
        frame[4] = 0xBA;
        frame[5] = 0xD1;

        let lenient = Session::new(TestHandler::with_stream(frame.clone()));
        let strict = Session::with_config(
            TestHandler::with_stream(frame),
            SessionConfig {
                strict_crc: true,
                ..Default::default()
            },
        );

        for (mut session, expect_output) in [(lenient, true), (strict, false)] {
            let outcome = session.run().unwrap();
            assert_eq!(outcome, SessionOutcome::Finished);

            let handler = session.into_handler();
            assert_eq!(handler.decode_errors, 1);
            assert_eq!(handler.pcm_frames.len(), expect_output as usize);
        }
    }
}
