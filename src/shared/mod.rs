//! Utilities shared by the `/api/chat` and `/api/stream` handlers

pub mod dispatch;
