//! Output module for crawl reports
//!
//! This module handles:
//! - Loading repository statistics for `--stats`
//! - Rendering crawl session summaries
//! - Rendering proxy readiness verdicts

pub mod stats;

pub use stats::{
    load_statistics, print_crawl_summary, print_statistics, render_crawl_summary,
    render_readiness, render_statistics,
};
