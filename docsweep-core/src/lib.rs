#![doc = "docsweep-core: core logic library for docsweep."]

//! This crate contains the business logic for the docsweep automation
//! toolkit: documentation-site link extraction, web-to-PDF merging, PDF
//! content-stream compression, and the storage-event gate that creates DLP
//! scan triggers for unlabelled buckets.
//!
//! External collaborators (bucket label reads, DLP trigger submission,
//! headless-browser rendering) are abstracted behind the traits in
//! [`contract`], so every pipeline is testable without a live cloud
//! connection or a browser.

pub mod compress;
pub mod contract;
pub mod dlp;
pub mod event;
pub mod links;
pub mod merge;
pub mod render;
pub mod storage;
