//! Crawler module: the resumable breadth-first crawl state machine
//!
//! This module contains the core crawling logic, including:
//! - Frontier processing with depth limits and same-origin filtering
//! - Form filling with canned values and submission
//! - Checkpointing and resumption
//! - Traffic capture finalization on every exit path

mod coordinator;
mod forms;

pub use coordinator::{CrawlReport, Crawler};
pub use forms::{canned_value, EMAIL_VALUE, PASSWORD_VALUE, TEXT_VALUE};
