// Copyright (c) The gtest-runner Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of gtest console transcripts.
//!
//! A running test binary writes a stream of marker lines (`[ RUN      ] Foo.Bar`,
//! `[       OK ] Foo.Bar (5 ms)`, ...) interleaved with arbitrary output. The
//! [`TranscriptParser`] consumes that stream through a [`ProcessStream`] and turns it into
//! per-test results.

mod markers;
mod parser;
mod stream;

pub use markers::Marker;
pub use parser::*;
pub use stream::*;
