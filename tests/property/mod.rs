// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-based test modules

mod projection_idempotence;
mod replay;
