//! # Genome-base: coordinate-indexed genomic annotation arrays stored in SQLite databases.
//!
//! Genome-base ingests large genomic annotation files into sparse arrays and serves point and range queries
//! over them from a long-running daemon.
//! It is intended for interactive applications that need low-latency access to population frequencies,
//! clinical significance, gene annotations, and sample genotypes at specific genomic coordinates.
//!
//! ### Basic concepts
//!
//! Every cell of an array is addressed by a [`GenomicCoordinate`]: a chromosome number (1 to 25, with X, Y,
//! and MT as 23, 24, and 25), a 1-based position, and a third index that distinguishes records at the same
//! position.
//! For variants, the third index is assigned by an [`AllelePositionTable`] in first-seen order of the alleles
//! at the position.
//!
//! An array is a directory containing a SQLite database and a schema marker.
//! The cells are stored in table `Cells` in coordinate order, with one column per attribute.
//! Each committed batch is a write fragment listed in table `Fragments`.
//! Fragments can be merged with [`maintenance::optimize_array`].
//! See [`SparseArray`], [`ArrayWriter`], and [`ArrayHandle`] for the storage interface.
//!
//! ### Ingestion
//!
//! Each input kind is a [`Dataset`]: it parses lines of text into records and maps each record to a
//! coordinate and attribute values.
//! The [`ingest`] module batches the records, writes them, and reports what was skipped.
//! The supported kinds are gnomAD population frequencies ([`PopulationFrequencies`]), ClinVar clinical
//! significance ([`ClinicalVariants`]), GENCODE gene annotations ([`GeneFeatures`] and [`GeneRegions`]), and
//! VCF files with samples ([`SampleVariants`]).
//!
//! ### Queries
//!
//! The [`daemon`] keeps the arrays of a [`Workspace`] open and answers JSON requests over a Unix socket.

pub mod alleles;
pub mod classify;
pub mod coordinates;
pub mod daemon;
pub mod datasets;
pub mod error;
pub mod formats;
pub mod ingest;
pub mod logging;
pub mod maintenance;
pub mod store;
pub mod utils;
pub mod workspace;

pub use alleles::AllelePositionTable;
pub use coordinates::{ChromPolicy, GenomicCoordinate};
pub use daemon::{DaemonConfig, QueryDaemon, QueryService, ShutdownHandle};
pub use datasets::{ClinicalVariants, Dataset, GeneFeatures, GeneRegions, PopulationFrequencies, SampleVariants};
pub use error::{Error, Result};
pub use ingest::{IngestParams, IngestReport};
pub use store::{ArrayHandle, ArrayReader, ArraySchema, ArrayWriter, Batch, SparseArray, Subarray, Value};
pub use workspace::{ArrayKind, ArrayLayout, Workspace};
