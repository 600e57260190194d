//! Bitcoin utilities: key handling, fee sizing, inscription envelopes, PSBT inputs

pub mod fees;
pub mod keys;
pub mod psbt;
pub mod tapscript;

pub use fees::*;
pub use keys::*;
pub use psbt::*;
pub use tapscript::*;
