// Periodic mining loop

use crate::network::Node;
use tokio::time::{MissedTickBehavior, interval};

/// Every block interval, drain the mempool into new blocks
pub async fn run(node: Node) {
    let mut ticker = interval(node.config().block_time);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::info!("Mining started, block time {:?}", node.config().block_time);

    loop {
        ticker.tick().await;
        if let Err(e) = node.mine_pending().await {
            log::error!("Mining failed: {}", e);
        }
    }
}
