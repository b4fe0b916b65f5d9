// src/capture.rs

use crate::reconcile::{self, PartialPair, ReconciledPair, Reconciliation, ResolvedBy, ScanResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read frame {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid frame {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of still frames. One call is one photo: every code visible in it,
/// in detection order.
#[async_trait]
pub trait FrameScanner: Send + Sync {
    async fn scan_frame(&self) -> Result<Vec<ScanResult>, ScanError>;
}

/// Replays frames stored as JSON arrays of scan results, one file per capture.
pub struct JsonFrameScanner {
    frames: Mutex<VecDeque<PathBuf>>,
}

impl JsonFrameScanner {
    pub fn new(frames: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            frames: Mutex::new(frames.into_iter().collect()),
        }
    }
}

#[async_trait]
impl FrameScanner for JsonFrameScanner {
    async fn scan_frame(&self) -> Result<Vec<ScanResult>, ScanError> {
        let Some(path) = self.frames.lock().await.pop_front() else {
            return Err(ScanError::Unavailable("no frames left".to_string()));
        };
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(source) => return Err(ScanError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| ScanError::Decode { path, source })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// A capture is running or the cool-down has not elapsed; nothing was scanned.
    Busy,
    NoneDetected,
    /// Only one half is known so far; capture again.
    Waiting(PartialPair),
    Ready {
        pair: ReconciledPair,
        resolved_by: ResolvedBy,
    },
}

#[derive(Default)]
struct SessionState {
    halves: PartialPair,
    last_finished: Option<Instant>,
}

/// Runs one capture at a time and remembers a lone half between captures.
pub struct CaptureSession<S> {
    scanner: S,
    cooldown: Duration,
    in_flight: Mutex<()>,
    state: Mutex<SessionState>,
}

impl<S: FrameScanner> CaptureSession<S> {
    pub fn new(scanner: S, cooldown: Duration) -> Self {
        Self {
            scanner,
            cooldown,
            in_flight: Mutex::new(()),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub async fn halves(&self) -> PartialPair {
        self.state.lock().await.halves.clone()
    }

    /// Forget any half collected so far.
    pub async fn reset(&self) {
        self.state.lock().await.halves = PartialPair::default();
    }

    pub async fn capture(&self) -> Result<CaptureOutcome, ScanError> {
        let Ok(_in_flight) = self.in_flight.try_lock() else {
            info!("Capture already in flight");
            return Ok(CaptureOutcome::Busy);
        };
        if let Some(last) = self.state.lock().await.last_finished {
            if last.elapsed() < self.cooldown {
                info!("Capture ignored during cool-down");
                return Ok(CaptureOutcome::Busy);
            }
        }

        // state stays unlocked while the scanner runs
        let scanned = self.scanner.scan_frame().await;
        let mut state = self.state.lock().await;
        state.last_finished = Some(Instant::now());
        let results = match scanned {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Capture failed");
                return Err(e);
            }
        };

        let unique = reconcile::dedup_by_payload(&results);
        info!(raw = results.len(), unique = unique.len(), "Frame scanned");

        let outcome = match reconcile::reconcile(&unique) {
            Reconciliation::NoneDetected => CaptureOutcome::NoneDetected,
            Reconciliation::Pair { pair, resolved_by } => {
                state.halves = PartialPair::default();
                CaptureOutcome::Ready { pair, resolved_by }
            }
            Reconciliation::Partial(found) => {
                // a half already collected is never overwritten
                if state.halves.left.is_none() {
                    state.halves.left = found.left;
                }
                if state.halves.right.is_none() {
                    state.halves.right = found.right;
                }
                match state.halves.complete() {
                    Some(pair) => {
                        state.halves = PartialPair::default();
                        CaptureOutcome::Ready {
                            pair,
                            resolved_by: ResolvedBy::Content,
                        }
                    }
                    None => CaptureOutcome::Waiting(state.halves.clone()),
                }
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FakeScanner {
        frames: StdMutex<VecDeque<Result<Vec<ScanResult>, ScanError>>>,
        delay: Duration,
    }

    impl FakeScanner {
        fn new(frames: Vec<Result<Vec<ScanResult>, ScanError>>) -> Self {
            Self {
                frames: StdMutex::new(frames.into()),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl FrameScanner for FakeScanner {
        async fn scan_frame(&self) -> Result<Vec<ScanResult>, ScanError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.frames
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ScanError::Unavailable("empty".to_string())))
        }
    }

    fn frame(payloads: &[&str]) -> Result<Vec<ScanResult>, ScanError> {
        Ok(payloads.iter().map(|p| ScanResult::new(*p)).collect())
    }

    #[tokio::test]
    async fn test_pair_in_one_frame() {
        let session = CaptureSession::new(
            FakeScanner::new(vec![frame(&["**:B:1:2", "A:3:4"])]),
            Duration::ZERO,
        );
        let outcome = session.capture().await.unwrap();
        assert_eq!(
            outcome,
            CaptureOutcome::Ready {
                pair: ReconciledPair {
                    left: "A:3:4".to_string(),
                    right: ":B:1:2".to_string(),
                },
                resolved_by: ResolvedBy::Content,
            }
        );
    }

    #[tokio::test]
    async fn test_halves_accumulate_across_captures() {
        let session = CaptureSession::new(
            FakeScanner::new(vec![
                frame(&["A:1:2"]),
                frame(&[]),
                frame(&["OTHER_LEFT"]),
                frame(&["**:B:3:4"]),
            ]),
            Duration::ZERO,
        );

        let first = session.capture().await.unwrap();
        assert!(matches!(first, CaptureOutcome::Waiting(PartialPair { left: Some(_), right: None })));

        assert_eq!(session.capture().await.unwrap(), CaptureOutcome::NoneDetected);

        // a second LEFT does not replace the first
        session.capture().await.unwrap();
        assert_eq!(session.halves().await.left.as_deref(), Some("A:1:2"));

        let last = session.capture().await.unwrap();
        assert_eq!(
            last,
            CaptureOutcome::Ready {
                pair: ReconciledPair {
                    left: "A:1:2".to_string(),
                    right: ":B:3:4".to_string(),
                },
                resolved_by: ResolvedBy::Content,
            }
        );
        assert!(session.halves().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_halves() {
        let session = CaptureSession::new(
            FakeScanner::new(vec![
                frame(&["A:1:2"]),
                Err(ScanError::Unavailable("lens cap".to_string())),
            ]),
            Duration::ZERO,
        );
        session.capture().await.unwrap();
        assert!(session.capture().await.is_err());
        assert_eq!(session.halves().await.left.as_deref(), Some("A:1:2"));

        session.reset().await;
        assert!(session.halves().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_suppresses_rapid_triggers() {
        let session = CaptureSession::new(
            FakeScanner::new(vec![frame(&[]), frame(&["A:1:2"])]),
            Duration::from_millis(600),
        );
        assert_eq!(session.capture().await.unwrap(), CaptureOutcome::NoneDetected);
        assert_eq!(session.capture().await.unwrap(), CaptureOutcome::Busy);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(matches!(
            session.capture().await.unwrap(),
            CaptureOutcome::Waiting(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_capture_in_flight() {
        let mut scanner = FakeScanner::new(vec![frame(&["A:1:2", "**:B:1:2"])]);
        scanner.delay = Duration::from_millis(50);
        let session = CaptureSession::new(scanner, Duration::ZERO);

        let (first, second) = tokio::join!(session.capture(), session.capture());
        assert!(matches!(first.unwrap(), CaptureOutcome::Ready { .. }));
        assert_eq!(second.unwrap(), CaptureOutcome::Busy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_halves_readable_during_capture() {
        let mut scanner = FakeScanner::new(vec![frame(&["**:B:1:2"]), frame(&["A:3:4"])]);
        scanner.delay = Duration::from_millis(50);
        let session = CaptureSession::new(scanner, Duration::ZERO);
        session.capture().await.unwrap();

        let (outcome, halves) = tokio::join!(
            session.capture(),
            tokio::time::timeout(Duration::from_millis(1), session.halves())
        );
        assert_eq!(halves.unwrap().right.as_deref(), Some(":B:1:2"));
        assert!(matches!(outcome.unwrap(), CaptureOutcome::Ready { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_reader_does_not_make_capture_busy() {
        let mut scanner = FakeScanner::new(vec![frame(&["A:1:2"])]);
        scanner.delay = Duration::from_millis(50);
        let session = CaptureSession::new(scanner, Duration::ZERO);

        let (_, outcome) = tokio::join!(
            async {
                let guard = session.state.lock().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
                drop(guard);
            },
            session.capture()
        );
        assert!(matches!(outcome.unwrap(), CaptureOutcome::Waiting(_)));
    }

    #[tokio::test]
    async fn test_json_frame_scanner() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("frame1.json");
        let bad = dir.path().join("frame2.json");
        std::fs::write(&good, r#"[{"data": "A:1:2"}, {"data": "**:B:3:4"}]"#).unwrap();
        std::fs::write(&bad, "not json").unwrap();

        let scanner = JsonFrameScanner::new([good, bad]);
        assert_eq!(scanner.scan_frame().await.unwrap().len(), 2);
        assert!(matches!(scanner.scan_frame().await, Err(ScanError::Decode { .. })));
        assert!(matches!(scanner.scan_frame().await, Err(ScanError::Unavailable(_))));
    }
}
