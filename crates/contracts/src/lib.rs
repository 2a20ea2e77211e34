//! Contract bindings for the confidential Dutch auction client.
//!
//! This crate provides:
//! - Solidity interfaces of the auction, ERC20 and confidential ERC20 contracts
//! - The [`AuctionReader`], [`TokenReader`] and [`Wallet`] seams the client is
//!   written against
//! - [`RpcContracts`], which implements all three over Ethereum JSON-RPC

pub mod abi;
pub mod error;
pub mod reader;
pub mod rpc;
pub mod wallet;
pub mod wire;

pub use error::ContractError;
pub use reader::{AuctionReader, TokenReader};
pub use rpc::RpcContracts;
pub use wallet::Wallet;
