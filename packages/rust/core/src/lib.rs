//! Envelope preparation for ramlpreparer.
//!
//! This crate turns rendered API reference pages into content envelopes:
//! content ids, merged metadata, content-addressed assets, a table of
//! contents and edit links are derived by [`envelope::EnvelopeBuilder`] and
//! the result is written by [`serializer`]. [`pipeline`] runs that over a
//! whole source tree through a [`renderer::Renderer`].

pub mod assets;
pub mod edit_url;
pub mod envelope;
pub mod identity;
pub mod meta;
pub mod pipeline;
pub mod renderer;
pub mod serializer;
pub mod toc;

#[cfg(test)]
pub(crate) mod testing;

pub use envelope::{Assembled, EnvelopeBuilder};
pub use pipeline::{
    BatchReport, DocumentOutcome, DocumentStatus, ProgressReporter, SilentProgress, Source,
    discover_sources, prepare_all, prepare_document,
};
pub use renderer::{CommandRenderer, Renderer};
