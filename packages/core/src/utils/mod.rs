//! Utility functions for mdSilo Core
//!
//! Text helpers and link parsing shared by the indexes and services.

pub mod links;
pub mod text;

pub use links::{extract_links, href_to_title, rewrite_links, title_to_href, LinkKind, LinkRef};
pub use text::{ci_string_compare, ci_string_equal, is_daily_title, is_url, shorten_string};
