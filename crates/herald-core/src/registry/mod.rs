//! Registry - owner ごとの定義表と binding kind
//!
//! `$define` に相当する。kind は `Kind::new(key, variance)` で自由に作れ、
//! 標準では `HANDLE` / `PROVIDE` / `LOOKUP` の 3 つを使う。

mod definitions;
mod kind;

pub use definitions::Definitions;
pub use kind::{Definition, HANDLE, Kind, LOOKUP, PROVIDE, Unregister};
