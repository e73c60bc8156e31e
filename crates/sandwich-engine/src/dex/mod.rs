pub mod builder;
pub mod decoder;
pub mod path;

pub use builder::{backrun_calldata, frontrun_calldata, LegParams};
pub use decoder::{decode_swap, detect_swap_function, AmountBounds, DecodedSwap, SwapMethod};
pub use path::{decode_packed_path, encode_packed_path};
