//! `RetryPolicy` under a paused clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use outpost_cli::application::{CancelToken, RetryPolicy};
use outpost_cli::domain::ProvisionError;
use outpost_common::ErrorKind;
use tokio::time::Instant;

fn unreachable() -> ProvisionError {
    ProvisionError::Unreachable {
        address: "192.168.1.1".into(),
        reason: "no route to host".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn fails_twice_then_succeeds_on_third_attempt() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(3, Duration::from_secs(1));

    let out = policy
        .execute(&CancelToken::new(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if n < 3 { Err(unreachable()) } else { Ok(n) } }
        })
        .await;

    assert_eq!(out.result, Ok(3));
    assert_eq!(out.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn always_transient_exhausts_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(2, Duration::from_secs(1));

    let out = policy
        .execute(&CancelToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ProvisionError::ConnectivityTimeout("ping".into())) }
        })
        .await;

    let err = out.result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
    assert_eq!(err.cause_kind(), Some(ErrorKind::ConnectivityTimeout));
    assert_eq!(out.attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn non_transient_error_is_not_retried() {
    let calls = AtomicU32::new(0);
    let policy = RetryPolicy::new(5, Duration::from_secs(1));
    let start = Instant::now();

    let out = policy
        .execute(&CancelToken::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(ProvisionError::Unauthorized {
                    hardware_id: "AABBCCDDEEFF".into(),
                })
            }
        })
        .await;

    assert_eq!(out.result.unwrap_err().kind(), ErrorKind::Unauthorized);
    assert_eq!(out.attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn exponential_backoff_sleeps_between_attempts() {
    let policy = RetryPolicy::new(3, Duration::from_secs(1));
    let start = Instant::now();

    let out = policy
        .execute(&CancelToken::new(), || async { Err::<(), _>(unreachable()) })
        .await;

    assert_eq!(out.attempts, 3);
    // 1s after the first failure, 2s after the second, none after the last.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_backoff() {
    let policy = RetryPolicy::new(5, Duration::from_secs(60));
    let cancel = CancelToken::new();
    let start = Instant::now();

    let (out, ()) = tokio::join!(
        policy.execute(&cancel, || async { Err::<(), _>(unreachable()) }),
        async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        }
    );

    assert_eq!(out.result, Err(ProvisionError::Cancelled));
    assert_eq!(out.attempts, 1);
    assert!(start.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn cancellation_is_not_reported_as_exhaustion() {
    let policy = RetryPolicy::new(1, Duration::from_secs(1));
    let cancel = CancelToken::new();

    let out = policy
        .execute(&cancel, || {
            cancel.cancel();
            async { Err::<(), _>(unreachable()) }
        })
        .await;

    assert_eq!(out.result, Err(ProvisionError::Cancelled));
    assert_eq!(out.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_stops_before_crossing() {
    // Delays 1s, 2s, 4s: the third backoff would end at 7s, past the 4s deadline.
    let policy = RetryPolicy::new(10, Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(10))
        .with_deadline(Duration::from_secs(4));
    let start = Instant::now();

    let out = policy
        .execute(&CancelToken::new(), || async { Err::<(), _>(unreachable()) })
        .await;

    let err = out.result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
    assert_eq!(err.cause_kind(), Some(ErrorKind::Unreachable));
    assert_eq!(out.attempts, 3);
    assert!(start.elapsed() <= Duration::from_secs(4));
}
