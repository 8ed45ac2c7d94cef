//! Push-to-pull stream bridge
//!
//! The runtime pushes payloads into a [`StreamSink`] from whatever thread it
//! generates on; a single consumer pulls [`StreamEvent`]s out of the paired
//! [`TextStream`]. Every event goes through a FIFO queue; a parked reader
//! only holds a wake-up signal, so dropping a pending read never loses an
//! event. Nothing here applies backpressure: a slow consumer lets the queue
//! grow rather than lose events.
//!
//! Cancelling the consumer stops delivery only. A runtime that wants to stop
//! generating early has to poll [`StreamSink::is_cancelled`] itself.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::Stream;
use tokio::sync::oneshot;

use crate::error::{LocalLmError, Result};

use super::protocol::{CumulativeDecoder, StreamEvent, encode_error};

/// Create a connected producer/consumer pair
pub fn channel() -> (StreamSink, TextStream) {
    let shared = Arc::new(Shared {
        state: Mutex::new(BridgeState::default()),
    });
    (
        StreamSink {
            shared: Arc::clone(&shared),
        },
        TextStream { shared },
    )
}

struct Shared {
    state: Mutex<BridgeState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
struct BridgeState {
    decoder: CumulativeDecoder,
    queue: VecDeque<StreamEvent>,
    /// Wakes the parked reader, if any
    waiter: Option<oneshot::Sender<()>>,
    /// A terminal payload has been accepted from the producer
    producer_done: bool,
    /// The consumer has seen a terminal event or cancelled
    consumer_done: bool,
    cancelled: bool,
}

impl BridgeState {
    /// Queue an event and wake the parked reader
    fn dispatch(&mut self, event: StreamEvent) {
        self.queue.push_back(event);
        if let Some(waiter) = self.waiter.take() {
            // A reader that has gone away finds the event on its next read
            let _ = waiter.send(());
        }
    }

    /// Next event if one is ready without waiting
    fn take_ready(&mut self) -> Option<StreamEvent> {
        if self.consumer_done {
            return Some(StreamEvent::End);
        }
        if let Some(event) = self.queue.pop_front() {
            if event.is_terminal() {
                self.consumer_done = true;
            }
            return Some(event);
        }
        if self.producer_done {
            self.consumer_done = true;
            return Some(StreamEvent::End);
        }
        None
    }
}

/// Producer half, driven by the runtime
pub struct StreamSink {
    shared: Arc<Shared>,
}

impl StreamSink {
    /// Deliver one raw payload: cumulative text, a sentinel-prefixed error,
    /// or `None` for end of stream. Payloads after a terminal one, or after
    /// the consumer cancelled, are discarded.
    pub fn deliver(&self, payload: Option<&str>) {
        let mut state = self.shared.lock();
        if state.cancelled || state.producer_done {
            return;
        }

        let Some(event) = state.decoder.feed(payload) else {
            return;
        };
        if event.is_terminal() {
            state.producer_done = true;
        }
        state.dispatch(event);
    }

    /// Report the cumulative text generated so far
    pub fn send_text(&self, cumulative: &str) {
        self.deliver(Some(cumulative));
    }

    /// Mark the end of generation
    pub fn finish(&self) {
        self.deliver(None);
    }

    /// Terminate the stream with an error
    pub fn fail(&self, message: &str) {
        self.deliver(Some(&encode_error(message)));
    }

    /// Whether the consumer has stopped listening
    pub fn is_cancelled(&self) -> bool {
        self.shared.lock().cancelled
    }

    /// Whether further payloads will be ignored
    pub fn is_closed(&self) -> bool {
        let state = self.shared.lock();
        state.cancelled || state.producer_done
    }
}

impl Drop for StreamSink {
    fn drop(&mut self) {
        if !self.is_closed() {
            log::warn!("Stream producer dropped before end of stream");
            self.fail("stream producer dropped before end of stream");
        }
    }
}

/// Consumer half: an ordered, cancellable sequence of text deltas
pub struct TextStream {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TextStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TextStream")
            .field("queued", &state.queue.len())
            .field("finished", &state.consumer_done)
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

impl TextStream {
    /// Wait for the next event.
    ///
    /// Returns `End` once the stream has finished, errored (after the error
    /// itself has been returned once) or been cancelled. Fails with
    /// `ConcurrentPull` if another call is already waiting.
    pub async fn next_event(&self) -> Result<StreamEvent> {
        loop {
            let wake = {
                let mut state = self.shared.lock();
                if let Some(event) = state.take_ready() {
                    return Ok(event);
                }
                if state.waiter.as_ref().is_some_and(|w| !w.is_closed()) {
                    return Err(LocalLmError::ConcurrentPull);
                }

                let (sender, receiver) = oneshot::channel();
                state.waiter = Some(sender);
                receiver
            };

            // Woken by the producer, or by cancel() dropping the sender
            let _ = wake.await;
        }
    }

    /// Next piece of text, `None` at end of stream
    pub async fn next_delta(&self) -> Result<Option<String>> {
        match self.next_event().await? {
            StreamEvent::Delta(text) => Ok(Some(text)),
            StreamEvent::End => Ok(None),
            StreamEvent::Error(message) => Err(LocalLmError::Generation(message)),
        }
    }

    /// Drain the stream into a single string
    pub async fn collect_text(&self) -> Result<String> {
        let mut text = String::new();
        while let Some(delta) = self.next_delta().await? {
            text.push_str(&delta);
        }
        Ok(text)
    }

    /// Stop consuming. Queued and future events are discarded and every
    /// later read returns `End` immediately.
    pub fn cancel(&self) {
        let mut state = self.shared.lock();
        if !state.cancelled {
            log::debug!("Stream cancelled with {} queued events", state.queue.len());
        }
        state.cancelled = true;
        state.consumer_done = true;
        state.queue.clear();
        state.waiter = None;
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.lock().cancelled
    }

    /// Adapt into a `futures::Stream` of deltas
    pub fn into_stream(self) -> impl Stream<Item = Result<String>> {
        futures::stream::unfold(self, |stream| async move {
            match stream.next_delta().await {
                Ok(Some(text)) => Some((Ok(text), stream)),
                Ok(None) => None,
                Err(e) => Some((Err(e), stream)),
            }
        })
    }
}

impl Drop for TextStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cumulative_payloads_become_deltas() {
        let (sink, stream) = channel();
        sink.send_text("Hel");
        sink.send_text("Hello");
        sink.send_text("Hello world");
        sink.finish();

        let mut events = Vec::new();
        loop {
            let event = stream.next_event().await.unwrap();
            let done = event.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }

        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("Hel".to_string()),
                StreamEvent::Delta("lo".to_string()),
                StreamEvent::Delta(" world".to_string()),
                StreamEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_repeated_payload_is_absorbed() {
        let (sink, stream) = channel();
        sink.send_text("Hello");
        sink.send_text("Hello");
        sink.finish();

        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::Delta("Hello".to_string()));
        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::End);
    }

    #[tokio::test]
    async fn test_error_is_terminal_and_delivered_once() {
        let (sink, stream) = channel();
        sink.deliver(Some("\u{2}model unavailable"));
        sink.send_text("late text");
        sink.finish();

        let err = stream.next_delta().await.unwrap_err();
        assert_eq!(err.to_string(), "Generation failed: model unavailable");
        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::End);
        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::End);
    }

    #[tokio::test]
    async fn test_cancel_discards_queued_events() {
        let (sink, stream) = channel();
        sink.send_text("buffered");

        stream.cancel();
        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::End);

        sink.send_text("buffered and more");
        assert!(sink.is_cancelled());
        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::End);
    }

    #[tokio::test]
    async fn test_end_after_end_stays_finished() {
        let (sink, stream) = channel();
        sink.finish();
        assert_eq!(stream.next_delta().await.unwrap(), None);
        assert_eq!(stream.next_delta().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pending_reader_is_resolved_by_producer_thread() {
        let (sink, stream) = channel();

        let producer = std::thread::spawn(move || {
            for text in ["a", "ab", "abc"] {
                std::thread::sleep(Duration::from_millis(5));
                sink.send_text(text);
            }
            sink.finish();
        });

        let text = stream.collect_text().await.unwrap();
        producer.join().unwrap();
        assert_eq!(text, "abc");
    }

    #[tokio::test]
    async fn test_concurrent_pull_fails_fast() {
        let (sink, stream) = channel();

        let mut first = Box::pin(stream.next_event());
        assert!(futures::poll!(&mut first).is_pending());

        let second = stream.next_event().await;
        assert!(matches!(second, Err(LocalLmError::ConcurrentPull)));

        sink.send_text("hi");
        assert_eq!(first.await.unwrap(), StreamEvent::Delta("hi".to_string()));
    }

    #[tokio::test]
    async fn test_abandoned_read_does_not_lose_events() {
        let (sink, stream) = channel();

        let timed_out = tokio::time::timeout(Duration::from_millis(10), stream.next_event()).await;
        assert!(timed_out.is_err());

        sink.send_text("kept");
        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::Delta("kept".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_pending_read_keeps_delivered_delta() {
        let (sink, stream) = channel();

        let mut pending = Box::pin(stream.next_event());
        assert!(futures::poll!(&mut pending).is_pending());
        sink.send_text("hello");
        drop(pending);

        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::Delta("hello".to_string()));
        sink.finish();
        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::End);
    }

    #[tokio::test]
    async fn test_dropped_pending_read_still_sees_end() {
        let (sink, stream) = channel();

        let mut pending = Box::pin(stream.next_event());
        assert!(futures::poll!(&mut pending).is_pending());
        sink.finish();
        drop(pending);

        let next = tokio::time::timeout(Duration::from_millis(200), stream.next_event()).await;
        assert_eq!(next.unwrap().unwrap(), StreamEvent::End);
    }

    #[tokio::test]
    async fn test_losing_select_branch_does_not_lose_events() {
        let (sink, stream) = channel();
        sink.send_text("a");
        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::Delta("a".to_string()));

        tokio::select! {
            biased;
            _ = stream.next_event() => panic!("nothing was ready"),
            _ = tokio::task::yield_now() => {}
        }
        sink.send_text("ab");
        sink.fail("boom");

        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::Delta("b".to_string()));
        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::Error("boom".to_string()));
        assert_eq!(stream.next_event().await.unwrap(), StreamEvent::End);
    }

    #[test]
    fn test_debug_shows_progress() {
        let (sink, stream) = channel();
        sink.send_text("x");
        let debug = format!("{:?}", stream);
        assert!(debug.contains("queued: 1"));
        assert!(debug.contains("cancelled: false"));
    }

    #[tokio::test]
    async fn test_cancel_wakes_parked_reader() {
        let (sink, stream) = channel();
        let stream = Arc::new(stream);

        let reader = {
            let stream = Arc::clone(&stream);
            tokio::spawn(async move { stream.next_event().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.cancel();

        assert_eq!(reader.await.unwrap().unwrap(), StreamEvent::End);
        drop(sink);
    }

    #[tokio::test]
    async fn test_dropped_sink_terminates_stream() {
        let (sink, stream) = channel();
        sink.send_text("partial");
        drop(sink);

        assert_eq!(stream.next_delta().await.unwrap(), Some("partial".to_string()));
        assert!(matches!(stream.next_delta().await, Err(LocalLmError::Generation(_))));
    }

    #[tokio::test]
    async fn test_dropping_consumer_cancels_producer() {
        let (sink, stream) = channel();
        drop(stream);
        assert!(sink.is_cancelled());
        assert!(sink.is_closed());
    }

    #[tokio::test]
    async fn test_into_stream_yields_deltas() {
        let (sink, stream) = channel();
        sink.send_text("one");
        sink.send_text("one two");
        sink.finish();

        let deltas: Vec<String> = stream.into_stream().map(|d| d.unwrap()).collect().await;
        assert_eq!(deltas, vec!["one".to_string(), " two".to_string()]);
    }
}
