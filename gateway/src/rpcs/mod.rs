mod chain;
mod generic;

pub use chain::{ChainHandler, Transport};
pub use generic::GenericChainHandler;
