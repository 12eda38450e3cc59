//! # Media Module
//!
//! Media type parsing and content negotiation.
//!
//! Declared `produces` lists are ranked against the request `Accept` ranges
//! by quality first and specificity second; declared `consumes` lists are
//! checked against the request `Content-Type`. A quality of 0 means
//! "not acceptable" and removes a candidate altogether.
//!
//! ```rust
//! use resrouter::media::{parse_accept, select_producer, MediaType};
//!
//! let declared: Vec<MediaType> = vec![
//!     "text/plain".parse().unwrap(),
//!     "application/xml".parse().unwrap(),
//! ];
//! let accept = parse_accept(["application/*;q=0.5, text/plain;q=0.5"]).unwrap();
//! assert_eq!(select_producer(&declared, &accept).unwrap().essence(), "text/plain");
//! ```

mod media_type;
mod negotiate;

pub use media_type::{parse_accept, MediaType, MediaTypeError, WILDCARD};
pub use negotiate::{
    best_consumer, best_producer, select_consumer, select_producer, Negotiated, Score, ANY,
};
