//! End-to-end scan tests against an in-memory odds provider.

mod mock_provider;
mod scan_flow;
