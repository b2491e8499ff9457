#![allow(dead_code)]

pub mod fake_player;
pub mod fake_recorder;

use std::time::Duration;
use tokio::sync::watch;

/// Wait until the published state satisfies `ready`, failing the test after two seconds
pub async fn wait_for<T: Clone>(rx: &mut watch::Receiver<T>, ready: impl FnMut(&T) -> bool) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(ready))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed")
        .clone()
}

/// Poll `check` until it holds, failing the test after two seconds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never became true");
}
