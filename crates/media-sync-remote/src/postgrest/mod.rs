//! Supabase-compatible PostgREST backend

pub mod api;
pub mod client;

pub use client::PostgrestRemote;
