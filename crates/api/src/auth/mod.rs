//! Access-token primitives. Tokens are issued by the main application; this
//! service only validates them.

pub mod jwt;
