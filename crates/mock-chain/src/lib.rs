//! Mock chain for local testing of the confidential Dutch auction client.
//!
//! This provides a JSON-RPC server that answers the Ethereum methods the
//! client uses and simulates the auction and token contracts in memory,
//! without requiring a real node.

use std::net::SocketAddr;
use std::sync::Arc;

use jsonrpsee::server::{Server, ServerHandle};
use parking_lot::RwLock;

pub mod rpc;
pub mod state;

pub use rpc::{MockChainApiServer, MockChainServer};
pub use state::{ChainError, ChainState, Genesis};

/// A running mock chain.
pub struct RunningChain {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    pub state: Arc<RwLock<ChainState>>,
}

impl RunningChain {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Start serving `genesis` on `addr`. Port 0 picks a free port.
pub async fn serve(addr: SocketAddr, genesis: Genesis) -> anyhow::Result<RunningChain> {
    let state = Arc::new(RwLock::new(ChainState::new(genesis)));
    let server = Server::builder().build(addr).await?;
    let addr = server.local_addr()?;
    let handle = server.start(MockChainServer::new(state.clone()).into_rpc());
    Ok(RunningChain {
        addr,
        handle,
        state,
    })
}
