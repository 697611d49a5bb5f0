//! UTXO coin selection and transaction pre-image construction shared by the
//! Bitcoin-derived chains (Bitcoin, Litecoin, Dogecoin, Dash, Bitcoin Cash).
//!
//! Chain differences live in [`network::NetworkParams`], an injected
//! read-only record. The flow is: [`manager::UnspentOutputManager`] holds the
//! known outputs per address, [`selection`] turns them into an immutable
//! [`preimage::PreImage`], and [`encoder::TransactionEncoder`] produces the
//! digests to sign and, once signatures come back, the wire bytes.

pub mod encoder;
pub mod error;
pub mod fee;
pub mod manager;
pub mod network;
pub mod preimage;
pub mod script;
pub mod selection;
pub mod utxo;
