//! Batched ingestion of parsed records into a sparse array.
//!
//! The pipeline consumes a lazy sequence of parsed input lines.
//! Each line yields zero or more records of a [`Dataset`].
//! For every record, the pipeline:
//!
//! 1. maps the chromosome label according to the dataset's [`ChromPolicy`];
//! 2. derives the third coordinate, usually from the run's [`AllelePositionTable`];
//! 3. checks the coordinate against the array domain;
//! 4. appends the coordinate and the attribute values to the current [`Batch`].
//!
//! A batch is written when it reaches [`IngestParams::batch_size`] and at the end of the input.
//! If the store rejects a batch, the batch is logged and dropped, and ingestion continues with the next one.
//! Dropped batches are not retried.
//! Malformed lines and records with unsupported chromosomes are skipped and counted.
//! Lines that are not valid UTF-8 are malformed.
//! If reading the input fails, the records read so far are still written and the error is stored in the report.
//!
//! Everything a run needs lives in a [`RunContext`] owned by the [`Pipeline`], and is dropped when the run ends.

use crate::alleles::AllelePositionTable;
use crate::coordinates::{self, GenomicCoordinate};
use crate::datasets::Dataset;
use crate::store::{ArraySchema, ArrayWriter, Batch, SparseArray};
use crate::{utils, Error, Result};

use std::fs;
use std::io::{self, BufRead};
use std::path::Path;

use serde::Serialize;


//-----------------------------------------------------------------------------

/// Ingestion parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestParams {
    /// Maximum number of cells in a batch.
    pub batch_size: usize,
    /// Log progress after this many input lines.
    pub progress_interval: usize,
    /// Forget the allele indexes of a chromosome once the input moves to another chromosome.
    ///
    /// Only safe when the input is sorted by chromosome.
    pub release_finished_chromosomes: bool,
}

impl IngestParams {
    /// Default batch size.
    pub const BATCH_SIZE: usize = 10_000;

    /// Default progress interval.
    pub const PROGRESS_INTERVAL: usize = 100_000;
}

impl Default for IngestParams {
    fn default() -> Self {
        IngestParams {
            batch_size: Self::BATCH_SIZE,
            progress_interval: Self::PROGRESS_INTERVAL,
            release_finished_chromosomes: false,
        }
    }
}

//-----------------------------------------------------------------------------

/// Summary of an ingestion run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Input lines seen.
    pub lines: usize,
    /// Records produced by the parser.
    pub records: usize,
    /// New cells written to the array.
    pub rows_written: usize,
    /// Cells that were already present with identical values.
    pub rows_unchanged: usize,
    /// Batches committed.
    pub batches_written: usize,
    /// Batches rejected by the store.
    pub batches_dropped: usize,
    /// Cells in rejected batches.
    pub rows_dropped: usize,
    /// Lines or records skipped as malformed.
    pub malformed: usize,
    /// Records skipped for an unsupported chromosome.
    pub unsupported_chromosomes: usize,
    /// Records mapped to the unplaced sentinel chromosome.
    pub unplaced: usize,
    /// Dataset-specific tallies.
    pub counts: Vec<(String, usize)>,
    /// The error that stopped reading the input early.
    pub read_error: Option<String>,
}

impl IngestReport {
    /// Returns the tally with the given label.
    pub fn count(&self, label: &str) -> Option<usize> {
        self.counts.iter().find(|(x, _)| x == label).map(|(_, n)| *n)
    }

    /// Returns `true` if the whole input was read.
    pub fn is_complete(&self) -> bool {
        self.read_error.is_none()
    }

    /// Returns the summary as lines of text.
    pub fn summary(&self) -> Vec<String> {
        let mut result = vec![
            format!("Lines: {}", self.lines),
            format!("Records: {}", self.records),
            format!("Cells written: {} ({} unchanged)", self.rows_written, self.rows_unchanged),
            format!("Batches: {} written, {} dropped ({} cells)", self.batches_written, self.batches_dropped, self.rows_dropped),
            format!("Skipped: {} malformed, {} unsupported chromosome, {} unplaced", self.malformed, self.unsupported_chromosomes, self.unplaced),
        ];
        for (label, count) in self.counts.iter() {
            result.push(format!("{}: {}", label, count));
        }
        if let Some(error) = self.read_error.as_ref() {
            result.push(format!("Input ended early: {}", error));
        }
        result
    }
}

/// State of one ingestion run.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    /// Allele indexes assigned so far.
    pub alleles: AllelePositionTable,
    /// Counters.
    pub report: IngestReport,
    current_chrom: Option<u8>,
}

//-----------------------------------------------------------------------------

/// The ingestion pipeline for one run against one array.
pub struct Pipeline<'a, D: Dataset> {
    dataset: &'a mut D,
    writer: &'a mut ArrayWriter,
    params: IngestParams,
    context: RunContext,
    batch: Batch,
}

impl<'a, D: Dataset> Pipeline<'a, D> {
    /// Creates a pipeline writing the dataset to the array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the array was not created for this dataset.
    pub fn new(dataset: &'a mut D, writer: &'a mut ArrayWriter, params: IngestParams) -> Result<Self> {
        if dataset.schema() != *writer.schema() {
            return Err(Error::Schema(format!(
                "Array {} was not created for {}", writer.path().display(), dataset.name()
            )));
        }
        dataset.resume(writer)?;
        let batch = Batch::new(writer.schema().attributes.len());
        let params = IngestParams { batch_size: params.batch_size.max(1), ..params };
        Ok(Pipeline { dataset, writer, params, context: RunContext::default(), batch })
    }

    /// Returns the run context.
    pub fn context(&self) -> &RunContext {
        &self.context
    }

    /// Parses an input line and adds the resulting records.
    pub fn push_line(&mut self, line: &str) {
        let line_num = self.context.report.lines + 1;
        let records = self.dataset.parse_line(line, line_num);
        self.push_parsed(records);
    }

    /// Parses raw input bytes as a line and adds the resulting records.
    ///
    /// A trailing line terminator is ignored.
    /// A line that is not valid UTF-8 is counted as malformed.
    pub fn push_bytes(&mut self, line: &[u8]) {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        match std::str::from_utf8(line) {
            Ok(line) => self.push_line(line),
            Err(err) => {
                let line_num = self.context.report.lines + 1;
                self.push_parsed(Err(Error::malformed(line_num, format!("Invalid UTF-8: {}", err))));
            },
        }
    }

    /// Parses lines from the reader until the end of the input.
    ///
    /// # Errors
    ///
    /// Returns the read error that stopped the input.
    /// The lines read before the error remain in the pipeline.
    pub fn push_reader<R: BufRead>(&mut self, mut reader: R) -> io::Result<()> {
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => return Ok(()),
                Ok(_) => self.push_bytes(&buffer),
                // The partial line is discarded.
                Err(err) => return Err(err),
            }
        }
    }

    /// Records the error that stopped reading the input.
    pub fn input_failed(&mut self, error: &dyn std::fmt::Display) {
        log::error!("Stopped reading the input after {} lines: {}", self.context.report.lines, error);
        self.context.report.read_error = Some(error.to_string());
    }

    /// Adds the records parsed from one input line.
    ///
    /// A parse error is logged and counted, and the line is skipped.
    pub fn push_parsed(&mut self, records: Result<Vec<D::Record>>) {
        self.context.report.lines += 1;
        match records {
            Ok(records) => {
                for record in records.iter() {
                    self.push_record(record);
                }
            },
            Err(err) => {
                log::warn!("Skipping line {}: {}", self.context.report.lines, err);
                self.context.report.malformed += 1;
            },
        }
        let interval = self.params.progress_interval;
        if interval > 0 && self.context.report.lines % interval == 0 {
            let report = &self.context.report;
            log::info!(
                "Processed {} lines, {} records, {} cells written",
                report.lines, report.records, report.rows_written
            );
        }
    }

    /// Adds a single record to the current batch, writing the batch if it is full.
    pub fn push_record(&mut self, record: &D::Record) {
        self.context.report.records += 1;
        let (label, pos) = self.dataset.locus(record);
        let chrom = match coordinates::chrom_to_int_with(label, self.dataset.chrom_policy()) {
            Ok(chrom) => chrom,
            Err(err) => {
                log::debug!("Skipping record: {}", err);
                self.context.report.unsupported_chromosomes += 1;
                return;
            },
        };
        if chrom == coordinates::UNPLACED_CHROM {
            self.context.report.unplaced += 1;
            return;
        }
        self.chromosome_changed(chrom);

        let index = self.dataset.index(record, chrom, pos, &mut self.context.alleles);
        let coord = GenomicCoordinate::new(chrom, pos, index);
        if !self.writer.schema().contains(&coord) {
            log::warn!("Skipping record: coordinate {} is outside the array domain", coord);
            self.context.report.malformed += 1;
            return;
        }

        self.dataset.tally(record);
        self.batch.push(coord, self.dataset.attributes(record));
        if self.batch.len() >= self.params.batch_size {
            self.flush();
        }
    }

    fn chromosome_changed(&mut self, chrom: u8) {
        if self.context.current_chrom == Some(chrom) {
            return;
        }
        if let Some(previous) = self.context.current_chrom {
            if self.params.release_finished_chromosomes {
                let released = self.context.alleles.release_chromosome(previous);
                log::debug!("Released {} allele keys on {}", released, coordinates::int_to_chrom(previous));
            }
        }
        self.context.current_chrom = Some(chrom);
    }

    /// Writes the current batch.
    ///
    /// A rejected batch is logged and dropped.
    pub fn flush(&mut self) {
        if self.batch.is_empty() {
            return;
        }
        let report = &mut self.context.report;
        match self.writer.write_batch(&self.batch) {
            Ok(inserted) => {
                report.batches_written += 1;
                report.rows_written += inserted;
                report.rows_unchanged += self.batch.len() - inserted;
            },
            Err(err) => {
                log::warn!("Dropping a batch of {} cells: {}", self.batch.len(), err);
                report.batches_dropped += 1;
                report.rows_dropped += self.batch.len();
            },
        }
        self.batch.clear();
    }

    /// Writes the last batch and the dataset tags, and returns the report.
    ///
    /// # Errors
    ///
    /// Passes through errors from writing the tags.
    pub fn finish(mut self) -> Result<IngestReport> {
        self.flush();
        for (key, value) in self.dataset.tags() {
            self.writer.set_tag(&key, &value)?;
        }
        let mut report = self.context.report;
        report.counts = self.dataset.counts();
        log::info!(
            "Finished {}: {} records, {} cells written, {} batches dropped",
            self.dataset.name(), report.records, report.rows_written, report.batches_dropped
        );
        Ok(report)
    }
}

//-----------------------------------------------------------------------------

/// Opens the array for writing, creating it with the schema if it does not exist.
///
/// If `overwrite` is set, an existing array is deleted first.
/// Otherwise new cells are added to the existing array.
///
/// # Errors
///
/// Returns [`Error::Schema`] if an existing array has a different schema.
/// Returns [`Error::ArrayLocked`] if another writer holds the array.
pub fn open_array<P: AsRef<Path>>(path: P, schema: &ArraySchema, overwrite: bool) -> Result<ArrayWriter> {
    let path = path.as_ref();
    if SparseArray::exists(path) {
        if overwrite {
            log::info!("Removing existing array {}", path.display());
            // Fails if another writer holds the array.
            drop(ArrayWriter::open(path)?);
            fs::remove_dir_all(path)?;
        } else if SparseArray::schema(path)? != *schema {
            return Err(Error::Schema(format!("Array {} has a different schema", path.display())));
        }
    }
    if !SparseArray::exists(path) {
        SparseArray::create(path, schema)?;
        log::info!("Created array {}", path.display());
    }
    ArrayWriter::open(path)
}

/// Ingests records already parsed from input lines.
///
/// Each item of `lines` holds the records from one input line.
pub fn ingest_records<D, I>(dataset: &mut D, lines: I, writer: &mut ArrayWriter, params: IngestParams) -> Result<IngestReport>
    where D: Dataset, I: IntoIterator<Item = Result<Vec<D::Record>>>
{
    let mut pipeline = Pipeline::new(dataset, writer, params)?;
    for records in lines {
        pipeline.push_parsed(records);
    }
    pipeline.finish()
}

/// Ingests text lines from the reader.
///
/// Parse errors in individual lines are counted.
/// If reading fails, the records read so far are written and the error is stored in [`IngestReport::read_error`].
///
/// # Errors
///
/// Returns an error if the array was not created for the dataset or writing the tags fails.
pub fn ingest_reader<D, R>(dataset: &mut D, reader: R, writer: &mut ArrayWriter, params: IngestParams) -> Result<IngestReport>
    where D: Dataset, R: BufRead
{
    let mut pipeline = Pipeline::new(dataset, writer, params)?;
    if let Err(err) = pipeline.push_reader(reader) {
        pipeline.input_failed(&err);
    }
    pipeline.finish()
}

/// Ingests a possibly gzip-compressed file.
///
/// # Errors
///
/// Returns [`Error::InputNotFound`] if the file does not exist.
pub fn ingest_file<D, P>(dataset: &mut D, filename: P, writer: &mut ArrayWriter, params: IngestParams) -> Result<IngestReport>
    where D: Dataset, P: AsRef<Path>
{
    ingest_files(dataset, &[filename], writer, params)
}

/// Ingests several possibly gzip-compressed files as a single run.
///
/// The files share the run context, so allele indexes stay consistent if the same site appears in more than
/// one file.
///
/// If a file cannot be read to the end, the records read so far are written, the remaining files are skipped, and
/// the error is stored in [`IngestReport::read_error`].
///
/// # Errors
///
/// Returns [`Error::InputNotFound`] if any of the files does not exist.
/// Nothing is written in that case.
pub fn ingest_files<D, P>(dataset: &mut D, filenames: &[P], writer: &mut ArrayWriter, params: IngestParams) -> Result<IngestReport>
    where D: Dataset, P: AsRef<Path>
{
    if let Some(missing) = filenames.iter().map(|x| x.as_ref()).find(|x| !utils::file_exists(x)) {
        return Err(Error::InputNotFound(missing.to_path_buf()));
    }
    let mut pipeline = Pipeline::new(dataset, writer, params)?;
    for filename in filenames.iter() {
        let filename = filename.as_ref();
        log::info!("Ingesting {} from {}", pipeline.dataset.name(), filename.display());
        let result = utils::open_file(filename).and_then(|reader| pipeline.push_reader(reader).map_err(Error::from));
        if let Err(err) = result {
            pipeline.input_failed(&format!("{}: {}", filename.display(), err));
            break;
        }
    }
    pipeline.finish()
}

//-----------------------------------------------------------------------------
