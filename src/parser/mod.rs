//! URL validation and video identifier extraction.
//!
//! Input strings are classified against an ordered list of accepted video
//! URL shapes (watch page, short link, shorts, embed, live, mobile watch
//! page). A matching URL yields a canonical [`VideoId`]; a non-matching one
//! yields the first failing [`InvalidUrlReason`] in a deterministic order.

mod url;

pub use url::{
    InvalidUrlReason, UrlValidation, VIDEO_ID_LEN, VideoId, is_valid, normalize,
    validate_with_details,
};
