use std::time::Duration;

use tokio::sync::watch;

/// `true` なら停止要求済み。
pub(crate) fn is_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow()
}

/// `wait` だけ眠る。途中で停止要求が来たら（送信側の drop も含む）`true` を返して即座に戻る。
pub(crate) async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, wait: Duration) -> bool {
    if is_requested(shutdown) {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(wait) => false,
        changed = shutdown.changed() => changed.is_err() || is_requested(shutdown),
    }
}
