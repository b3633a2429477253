//! Multi-tenant retrieval-augmented chat backend for customer support.
//!
//! Documents are embedded and stored per organization, incoming messages
//! are classified for sentiment and answered from retrieved context, and
//! completed turns accumulate into conversation history.

pub mod chat;
pub mod core;
pub mod embedding;
pub mod history;
pub mod index;
pub mod llm;
pub mod logging;
pub mod sentiment;
pub mod server;
pub mod state;
pub mod tenants;
pub mod text;
