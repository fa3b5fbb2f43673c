//! Integration tests for the folio pipeline

mod dispatch_spacing;
mod document_flow;
mod pipeline_scenarios;
mod support;
