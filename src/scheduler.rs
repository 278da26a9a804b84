use std::future::Future;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use tokio::task::JoinHandle;

/// Runs `job` once `delay` has elapsed.
pub fn spawn_after<F>(delay: Duration, job: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        job.await;
    })
}

/// Polls the local calendar date every `period` and calls `on_new_day` when it
/// changes, so "expired" markers refresh at midnight.
pub fn start_day_watch<F>(period: Duration, on_new_day: F) -> JoinHandle<()>
where
    F: Fn(NaiveDate) + Send + 'static,
{
    start_day_watch_with(period, || Local::now().date_naive(), on_new_day)
}

fn start_day_watch_with<C, F>(period: Duration, today: C, on_new_day: F) -> JoinHandle<()>
where
    C: Fn() -> NaiveDate + Send + 'static,
    F: Fn(NaiveDate) + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut current = today();
        loop {
            interval.tick().await;
            let now = today();
            if now != current {
                log::info!("day changed {current} -> {now}");
                current = now;
                on_new_day(now);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::{Arc, Mutex};

    #[tokio::test(start_paused = true)]
    async fn spawn_after_waits_for_the_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let handle = spawn_after(Duration::from_secs(5), async move {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!fired.load(Ordering::SeqCst));
        handle.await.unwrap();
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn day_watch_reports_each_change_once() {
        let offset = Arc::new(AtomicI64::new(0));
        let clock = offset.clone();
        let base = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let handle = start_day_watch_with(
            Duration::from_secs(60),
            move || base + chrono::Duration::days(clock.load(Ordering::SeqCst)),
            move |day| sink.lock().unwrap().push(day),
        );

        tokio::time::sleep(Duration::from_secs(61)).await;
        offset.store(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(180)).await;
        handle.abort();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![NaiveDate::from_ymd_opt(2025, 6, 11).unwrap()]
        );
    }
}
