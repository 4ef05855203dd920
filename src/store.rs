//! Sparse genomic arrays stored in SQLite databases.
//!
//! An array is a directory containing a SQLite database `array.db` and a JSON schema marker `__schema`.
//! The marker is written last when the array is created, and its presence is the only signal that a directory is an
//! array.
//!
//! # Layout
//!
//! Each cell is a row in table `Cells`, keyed by the three dimensions of the [`ArraySchema`].
//! The table is `WITHOUT ROWID`, so cells are clustered in coordinate order.
//! Every cell remembers the write fragment that created it.
//! Fragments are listed in table `Fragments`, with one row per committed batch.
//! Array metadata is stored as key-value pairs in table `Tags`.
//!
//! # Concurrency
//!
//! There is at most one [`ArrayWriter`] per array.
//! The writer holds an exclusive lock file `__lock` inside the array directory; a second writer or a maintenance run
//! fails with [`Error::ArrayLocked`] until the first one is dropped.
//! The database uses write-ahead logging, so readers never wait for the writer.
//!
//! Reading goes through an [`ArrayHandle`], which keeps a pool of read-only connections.
//! The handle can be shared between threads, and each thread borrows its own [`ArrayReader`].

use crate::coordinates::{self, GenomicCoordinate};
use crate::{utils, Error, Result};

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::types::ToSqlOutput;
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension, Row, ToSql};

use serde::{Deserialize, Serialize};


//-----------------------------------------------------------------------------

/// A dimension with a closed integer domain and a tile extent hint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    /// Column name.
    pub name: String,
    /// Smallest valid value.
    pub min: u32,
    /// Largest valid value.
    pub max: u32,
    /// Locality hint: cells within this many units are expected to be read together.
    pub tile: u32,
}

impl Dimension {
    /// Creates a new dimension.
    pub fn new(name: &str, min: u32, max: u32, tile: u32) -> Self {
        Dimension { name: name.to_string(), min, max, tile }
    }

    /// Returns `true` if the value is within the domain.
    pub fn contains(&self, value: u32) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Type of an attribute column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    Text,
    /// Boolean.
    Bool,
}

impl AttributeType {
    fn sql_type(&self) -> &'static str {
        match self {
            AttributeType::Int | AttributeType::Bool => "INTEGER",
            AttributeType::Float => "REAL",
            AttributeType::Text => "TEXT",
        }
    }
}

/// A named, typed attribute stored alongside each coordinate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Column name.
    pub name: String,
    /// Value type.
    #[serde(rename = "type")]
    pub kind: AttributeType,
}

impl Attribute {
    /// Creates a new attribute.
    pub fn new(name: &str, kind: AttributeType) -> Self {
        Attribute { name: name.to_string(), kind }
    }
}

//-----------------------------------------------------------------------------

/// Schema of a sparse array: three dimensions and an ordered list of attributes.
///
/// The first two dimensions are always chromosome and position with the fixed domains from [`coordinates`].
/// The third dimension disambiguates cells at the same position, and its domain depends on the dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArraySchema {
    /// Schema version.
    pub version: String,
    /// Chromosome, position, and index dimensions.
    pub dimensions: [Dimension; 3],
    /// Attribute columns.
    pub attributes: Vec<Attribute>,
}

impl ArraySchema {
    /// Current schema version.
    pub const VERSION: &'static str = "genome-base array v1";

    // Column names reserved for bookkeeping.
    const RESERVED: [&'static str; 1] = ["fragment"];

    /// Creates a schema with the standard chromosome and position dimensions.
    pub fn new(index: Dimension, attributes: Vec<Attribute>) -> Self {
        let chrom = Dimension::new(
            "chrom", coordinates::MIN_CHROM as u32, coordinates::MAX_CHROM as u32, 1
        );
        let pos = Dimension::new("pos", coordinates::MIN_POS, coordinates::MAX_POS, 100_000);
        ArraySchema {
            version: Self::VERSION.to_string(),
            dimensions: [chrom, pos, index],
            attributes,
        }
    }

    /// Returns the position of the attribute with the given name.
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|attr| attr.name == name)
    }

    /// Returns `true` if the coordinate is within the domain of every dimension.
    pub fn contains(&self, coord: &GenomicCoordinate) -> bool {
        self.dimensions[0].contains(coord.chrom as u32)
            && self.dimensions[1].contains(coord.pos)
            && self.dimensions[2].contains(coord.index)
    }

    /// Checks that the schema can be stored.
    ///
    /// Names must be unique identifiers, and every domain must be non-empty with a positive tile extent.
    pub fn validate(&self) -> Result<()> {
        if self.version != Self::VERSION {
            return Err(Error::Schema(format!("Unsupported schema version: {} (expected {})", self.version, Self::VERSION)));
        }
        let mut names: Vec<&str> = Vec::new();
        for dim in self.dimensions.iter() {
            if dim.min > dim.max || dim.tile == 0 {
                return Err(Error::Schema(format!("Invalid domain or tile for dimension {}", dim.name)));
            }
            names.push(&dim.name);
        }
        for attr in self.attributes.iter() {
            names.push(&attr.name);
        }
        for (i, name) in names.iter().enumerate() {
            if !is_identifier(name) || Self::RESERVED.contains(name) {
                return Err(Error::Schema(format!("Invalid column name: {:?}", name)));
            }
            if names[..i].contains(name) {
                return Err(Error::Schema(format!("Duplicate column name: {}", name)));
            }
        }
        Ok(())
    }

    // Comma-separated quoted dimension names.
    fn dimension_list(&self) -> String {
        let names: Vec<String> = self.dimensions.iter().map(|dim| quote(&dim.name)).collect();
        names.join(", ")
    }

    // Comma-separated quoted attribute names.
    fn attribute_list(&self) -> String {
        let names: Vec<String> = self.attributes.iter().map(|attr| quote(&attr.name)).collect();
        names.join(", ")
    }

    fn create_table_sql(&self) -> String {
        let mut columns: Vec<String> = Vec::new();
        for dim in self.dimensions.iter() {
            columns.push(format!("{} INTEGER NOT NULL", quote(&dim.name)));
        }
        columns.push(String::from("fragment INTEGER NOT NULL"));
        for attr in self.attributes.iter() {
            columns.push(format!("{} {} NOT NULL", quote(&attr.name), attr.kind.sql_type()));
        }
        format!(
            "CREATE TABLE Cells (\n{},\nPRIMARY KEY ({})\n) STRICT, WITHOUT ROWID",
            columns.join(",\n"), self.dimension_list()
        )
    }

    fn insert_sql(&self) -> String {
        let params: Vec<String> = (1..=self.attributes.len() + 4).map(|i| format!("?{}", i)).collect();
        let mut columns = format!("{}, fragment", self.dimension_list());
        if !self.attributes.is_empty() {
            columns.push_str(", ");
            columns.push_str(&self.attribute_list());
        }
        format!(
            "INSERT INTO Cells({}) VALUES ({}) ON CONFLICT DO NOTHING",
            columns, params.join(", ")
        )
    }

    fn select_cell_sql(&self) -> String {
        let [chrom, pos, index] = &self.dimensions;
        format!(
            "SELECT {} FROM Cells WHERE {} = ?1 AND {} = ?2 AND {} = ?3",
            self.select_attributes(), quote(&chrom.name), quote(&pos.name), quote(&index.name)
        )
    }

    fn select_range_sql(&self) -> String {
        let [chrom, pos, index] = &self.dimensions;
        let mut columns = self.dimension_list();
        if !self.attributes.is_empty() {
            columns.push_str(", ");
            columns.push_str(&self.attribute_list());
        }
        format!(
            "SELECT {} FROM Cells
            WHERE {c} >= ?1 AND {c} < ?2 AND {p} >= ?3 AND {p} < ?4 AND {i} >= ?5 AND {i} < ?6
            ORDER BY {c}, {p}, {i}",
            columns, c = quote(&chrom.name), p = quote(&pos.name), i = quote(&index.name)
        )
    }

    fn select_attributes(&self) -> String {
        // An existence check still needs one column.
        if self.attributes.is_empty() { String::from("1") } else { self.attribute_list() }
    }

    fn domain_sql(&self) -> String {
        let [chrom, pos, index] = &self.dimensions;
        format!(
            "SELECT MIN({c}), MAX({c}), MIN({p}), MAX({p}), MIN({i}), MAX({i}) FROM Cells",
            c = quote(&chrom.name), p = quote(&pos.name), i = quote(&index.name)
        )
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name)
}

//-----------------------------------------------------------------------------

/// An attribute value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// String value.
    Text(String),
    /// Boolean value.
    Bool(bool),
}

impl Value {
    /// Returns the type of the value.
    pub fn kind(&self) -> AttributeType {
        match self {
            Value::Int(_) => AttributeType::Int,
            Value::Float(_) => AttributeType::Float,
            Value::Text(_) => AttributeType::Text,
            Value::Bool(_) => AttributeType::Bool,
        }
    }

    /// Returns the integer value, or [`None`] if this is not an integer.
    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(value) = self { Some(*value) } else { None }
    }

    /// Returns the float value, or [`None`] if this is not a float.
    pub fn as_float(&self) -> Option<f64> {
        if let Value::Float(value) = self { Some(*value) } else { None }
    }

    /// Returns the string value, or [`None`] if this is not a string.
    pub fn as_str(&self) -> Option<&str> {
        if let Value::Text(value) = self { Some(value) } else { None }
    }

    /// Returns the boolean value, or [`None`] if this is not a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(value) = self { Some(*value) } else { None }
    }

    fn from_row(row: &Row, index: usize, kind: AttributeType) -> rusqlite::Result<Self> {
        match kind {
            AttributeType::Int => Ok(Value::Int(row.get(index)?)),
            AttributeType::Float => Ok(Value::Float(row.get(index)?)),
            AttributeType::Text => Ok(Value::Text(row.get(index)?)),
            AttributeType::Bool => Ok(Value::Bool(row.get(index)?)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{}", value),
            Value::Text(value) => write!(f, "{}", value),
            Value::Bool(value) => write!(f, "{}", value),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Int(value) => value.to_sql(),
            Value::Float(value) => value.to_sql(),
            Value::Text(value) => value.to_sql(),
            Value::Bool(value) => value.to_sql(),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

//-----------------------------------------------------------------------------

/// A batch of cells to be written atomically: coordinates and aligned attribute columns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Batch {
    coordinates: Vec<GenomicCoordinate>,
    columns: Vec<Vec<Value>>,
}

impl Batch {
    /// Creates an empty batch with the given number of attribute columns.
    pub fn new(attributes: usize) -> Self {
        Batch {
            coordinates: Vec::new(),
            columns: vec![Vec::new(); attributes],
        }
    }

    /// Creates a batch from columns.
    ///
    /// The shape is not checked until the batch is written.
    pub fn from_columns(coordinates: Vec<GenomicCoordinate>, columns: Vec<Vec<Value>>) -> Self {
        Batch { coordinates, columns }
    }

    /// Appends a cell, distributing the row over the attribute columns.
    pub fn push(&mut self, coord: GenomicCoordinate, row: Vec<Value>) {
        self.coordinates.push(coord);
        for (i, value) in row.into_iter().enumerate() {
            if i >= self.columns.len() {
                self.columns.push(Vec::new());
            }
            self.columns[i].push(value);
        }
    }

    /// Returns the number of cells in the batch.
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    /// Returns `true` if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Removes all cells but keeps the number of columns.
    pub fn clear(&mut self) {
        self.coordinates.clear();
        for column in self.columns.iter_mut() {
            column.clear();
        }
    }

    /// Returns the coordinates.
    pub fn coordinates(&self) -> &[GenomicCoordinate] {
        &self.coordinates
    }

    /// Returns the attribute columns.
    pub fn columns(&self) -> &[Vec<Value>] {
        &self.columns
    }
}

//-----------------------------------------------------------------------------

/// A half-open interval on every dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subarray {
    /// Chromosome interval.
    pub chrom: Range<u32>,
    /// Position interval.
    pub pos: Range<u32>,
    /// Index interval.
    pub index: Range<u32>,
}

impl Subarray {
    /// Returns a subarray covering every cell.
    pub fn all() -> Self {
        Subarray { chrom: 0..u32::MAX, pos: 0..u32::MAX, index: 0..u32::MAX }
    }

    /// Returns a subarray covering positions `pos` on the chromosome, or on all chromosomes if `chrom` is [`None`].
    pub fn interval(chrom: Option<u8>, pos: Range<u32>) -> Self {
        let chrom = match chrom {
            Some(chrom) => (chrom as u32)..(chrom as u32 + 1),
            None => (coordinates::MIN_CHROM as u32)..(coordinates::MAX_CHROM as u32 + 1),
        };
        Subarray { chrom, pos, index: 0..u32::MAX }
    }

    /// Returns a subarray covering all cells at a single position.
    pub fn point(chrom: u8, pos: u32) -> Self {
        Self::interval(Some(chrom), pos..pos.saturating_add(1))
    }
}

/// Cells returned by a read, with attribute columns aligned by row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cells {
    /// Coordinates in coordinate order.
    pub coordinates: Vec<GenomicCoordinate>,
    /// One column per attribute.
    pub columns: Vec<Vec<Value>>,
    names: Vec<String>,
}

impl Cells {
    /// Returns the number of cells.
    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    /// Returns `true` if there are no cells.
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Returns the column for the named attribute.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        let index = self.names.iter().position(|x| x == name)?;
        Some(&self.columns[index])
    }

    /// Returns the value of the named attribute in the given row.
    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        self.column(name)?.get(row)
    }
}

/// Bounding box of the stored cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NonEmptyDomain {
    /// Smallest and largest chromosome.
    pub chrom: (u8, u8),
    /// Smallest and largest position.
    pub pos: (u32, u32),
    /// Smallest and largest index.
    pub index: (u32, u32),
}

fn query_domain(connection: &Connection, sql: &str) -> Result<Option<NonEmptyDomain>> {
    let mut statement = connection.prepare_cached(sql)?;
    let domain = statement.query_row((), |row| {
        let chrom: Option<(u8, u8)> = row.get::<_, Option<u8>>(0)?.zip(row.get::<_, Option<u8>>(1)?);
        let pos: Option<(u32, u32)> = row.get::<_, Option<u32>>(2)?.zip(row.get::<_, Option<u32>>(3)?);
        let index: Option<(u32, u32)> = row.get::<_, Option<u32>>(4)?.zip(row.get::<_, Option<u32>>(5)?);
        Ok(match (chrom, pos, index) {
            (Some(chrom), Some(pos), Some(index)) => Some(NonEmptyDomain { chrom, pos, index }),
            _ => None,
        })
    })?;
    Ok(domain)
}

//-----------------------------------------------------------------------------

/// Creating and maintaining arrays.
pub struct SparseArray;

impl SparseArray {
    /// Name of the schema marker file.
    pub const SCHEMA_MARKER: &'static str = "__schema";

    /// Name of the database file.
    pub const DATABASE: &'static str = "array.db";

    /// Name of the writer lock file.
    pub const LOCK: &'static str = "__lock";

    // Key for the array version.
    const KEY_VERSION: &'static str = "version";

    // Key for creation time.
    const KEY_CREATED: &'static str = "created";

    /// Returns `true` if the directory contains an array.
    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().join(Self::SCHEMA_MARKER).is_file()
    }

    /// Reads the schema of an existing array.
    pub fn schema<P: AsRef<Path>>(path: P) -> Result<ArraySchema> {
        let path = path.as_ref();
        if !Self::exists(path) {
            return Err(Error::NotAnArray(path.to_path_buf()));
        }
        let text = fs::read_to_string(path.join(Self::SCHEMA_MARKER))?;
        let schema: ArraySchema = serde_json::from_str(&text)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Creates a new empty array in the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the array already exists or the schema is invalid.
    /// Passes through any I/O and database errors.
    pub fn create<P: AsRef<Path>>(path: P, schema: &ArraySchema) -> Result<()> {
        let path = path.as_ref();
        if Self::exists(path) {
            return Err(Error::ArrayExists(path.to_path_buf()));
        }
        schema.validate()?;
        log::info!("Creating array {}", path.display());

        // Remove leftovers from an interrupted creation.
        fs::create_dir_all(path)?;
        for suffix in ["", "-wal", "-shm"] {
            let filename = path.join(format!("{}{}", Self::DATABASE, suffix));
            if utils::file_exists(&filename) {
                fs::remove_file(&filename)?;
            }
        }

        let mut connection = Connection::open(path.join(Self::DATABASE))?;
        connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        connection.execute(
            "CREATE TABLE Tags (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            ) STRICT",
            (),
        )?;
        connection.execute(
            "CREATE TABLE Fragments (
                id INTEGER PRIMARY KEY,
                cells INTEGER NOT NULL,
                created INTEGER NOT NULL
            ) STRICT",
            (),
        )?;
        connection.execute(&schema.create_table_sql(), ())?;

        let transaction = connection.transaction()?;
        {
            let mut insert = transaction.prepare(
                "INSERT INTO Tags(key, value) VALUES (?1, ?2)"
            )?;
            insert.execute((Self::KEY_VERSION, &schema.version))?;
            insert.execute((Self::KEY_CREATED, timestamp()))?;
        }
        transaction.commit()?;
        drop(connection);

        // The marker makes the array visible.
        let marker = serde_json::to_string_pretty(schema)?;
        fs::write(path.join(Self::SCHEMA_MARKER), marker)?;
        Ok(())
    }

    /// Removes the writer lock of the array and returns the process id recorded in it.
    ///
    /// Returns [`None`] if the array was not locked.
    /// This is meant for recovering from a writer that crashed; removing the lock of a live writer allows a second
    /// writer to open the array.
    pub fn unlock<P: AsRef<Path>>(path: P) -> Result<Option<String>> {
        let path = path.as_ref();
        if !Self::exists(path) {
            return Err(Error::NotAnArray(path.to_path_buf()));
        }
        let lock = path.join(Self::LOCK);
        match fs::read_to_string(&lock) {
            Ok(owner) => {
                fs::remove_file(&lock)?;
                log::info!("Removed the writer lock of {}", path.display());
                Ok(Some(owner.trim().to_string()))
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Io(err)),
        }
    }

    /// Merges all write fragments of the array into one.
    ///
    /// Returns the number of fragments before consolidation.
    /// Fails with [`Error::ArrayLocked`] if a writer or another maintenance run holds the array.
    pub fn consolidate<P: AsRef<Path>>(path: P) -> Result<usize> {
        let mut writer = ArrayWriter::open(path)?;
        writer.consolidate()
    }

    /// Reclaims space freed by superseded data.
    ///
    /// Fails with [`Error::ArrayLocked`] if a writer or another maintenance run holds the array.
    pub fn vacuum<P: AsRef<Path>>(path: P) -> Result<()> {
        let mut writer = ArrayWriter::open(path)?;
        writer.vacuum()
    }
}

fn timestamp() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|x| x.as_secs() as i64).unwrap_or(0)
}

//-----------------------------------------------------------------------------

// Exclusive lock file, removed on drop.
#[derive(Debug)]
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    // A lock left behind by a process that no longer exists is removed once.
    fn acquire(array: &Path) -> Result<Self> {
        let path = array.join(SparseArray::LOCK);
        for attempt in 0..2 {
            let file = OpenOptions::new().write(true).create_new(true).open(&path);
            match file {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(LockFile { path });
                },
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    match Self::owner(&path) {
                        Some(pid) if attempt == 0 && !process_exists(pid) => {
                            log::warn!("Removing a stale lock on {} held by process {}", array.display(), pid);
                            fs::remove_file(&path)?;
                        },
                        _ => break,
                    }
                },
                Err(err) => return Err(Error::Io(err)),
            }
        }
        Err(Error::ArrayLocked(array.to_path_buf()))
    }

    // Returns the process id stored in the lock file.
    fn owner(path: &Path) -> Option<u32> {
        fs::read_to_string(path).ok().and_then(|text| text.trim().parse().ok())
    }
}

// Returns `false` only if the process is known not to exist.
fn process_exists(pid: u32) -> bool {
    let proc = Path::new("/proc");
    if !proc.join("self").exists() {
        return true;
    }
    proc.join(pid.to_string()).exists()
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

//-----------------------------------------------------------------------------

/// The single writer of an array.
///
/// Each [`ArrayWriter::write_batch`] call is one atomic write fragment.
#[derive(Debug)]
pub struct ArrayWriter {
    path: PathBuf,
    schema: ArraySchema,
    connection: Connection,
    insert_sql: String,
    select_sql: String,
    _lock: LockFile,
}

impl ArrayWriter {
    /// Opens the array for writing and takes the writer lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAnArray`] if the array does not exist and [`Error::ArrayLocked`] if it is already held.
    /// Passes through any database errors.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let schema = SparseArray::schema(path)?;
        let lock = LockFile::acquire(path)?;
        let connection = Connection::open(path.join(SparseArray::DATABASE))?;
        connection.busy_timeout(Duration::from_secs(30))?;
        Ok(ArrayWriter {
            path: path.to_path_buf(),
            insert_sql: schema.insert_sql(),
            select_sql: schema.select_cell_sql(),
            schema,
            connection,
            _lock: lock,
        })
    }

    /// Returns the path to the array.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the schema of the array.
    pub fn schema(&self) -> &ArraySchema {
        &self.schema
    }

    /// Returns the bounding box of the stored cells, or [`None`] if the array is empty.
    pub fn non_empty_domain(&self) -> Result<Option<NonEmptyDomain>> {
        query_domain(&self.connection, &self.schema.domain_sql())
    }

    // Checks the shape of the batch and the domains of the coordinates.
    fn validate(&self, batch: &Batch) -> Result<()> {
        let attributes = &self.schema.attributes;
        if batch.columns.len() != attributes.len() {
            return Err(Error::StoreWriteRejected(format!(
                "Expected {} attribute columns, got {}", attributes.len(), batch.columns.len()
            )));
        }
        for (column, attr) in batch.columns.iter().zip(attributes.iter()) {
            if column.len() != batch.len() {
                return Err(Error::StoreWriteRejected(format!(
                    "Attribute {} has {} values for {} coordinates", attr.name, column.len(), batch.len()
                )));
            }
            if let Some(value) = column.iter().find(|value| value.kind() != attr.kind) {
                return Err(Error::StoreWriteRejected(format!(
                    "Attribute {} expects {:?} values, got {:?}", attr.name, attr.kind, value.kind()
                )));
            }
        }
        if let Some(coord) = batch.coordinates.iter().find(|coord| !self.schema.contains(coord)) {
            return Err(Error::StoreWriteRejected(format!("Coordinate {} is outside the array domain", coord)));
        }
        Ok(())
    }

    /// Writes the batch as one fragment and returns the number of new cells.
    ///
    /// Rewriting a cell with identical attribute values is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreWriteRejected`] if the batch has the wrong shape, a coordinate is outside the domain, or
    /// a coordinate already holds different values.
    /// Nothing from a rejected batch is committed.
    pub fn write_batch(&mut self, batch: &Batch) -> Result<usize> {
        self.validate(batch)?;
        if batch.is_empty() {
            return Ok(0);
        }

        let attributes = self.schema.attributes.len();
        let transaction = self.connection.transaction()?;
        transaction.execute(
            "INSERT INTO Fragments(cells, created) VALUES (0, ?1)",
            (timestamp(),),
        )?;
        let fragment = transaction.last_insert_rowid();

        let mut inserted = 0;
        {
            let mut insert = transaction.prepare(&self.insert_sql)?;
            let mut select = transaction.prepare(&self.select_sql)?;
            let mut row: Vec<&dyn ToSql> = Vec::with_capacity(attributes + 4);
            for (i, coord) in batch.coordinates.iter().enumerate() {
                row.clear();
                row.push(&coord.chrom);
                row.push(&coord.pos);
                row.push(&coord.index);
                row.push(&fragment);
                for column in batch.columns.iter() {
                    row.push(&column[i]);
                }
                if insert.execute(params_from_iter(row.iter()))? > 0 {
                    inserted += 1;
                    continue;
                }

                // The cell exists. Accept it only if the values are identical.
                let existing = select.query_row((coord.chrom, coord.pos, coord.index), |found| {
                    let mut values = Vec::with_capacity(attributes);
                    for (j, attr) in self.schema.attributes.iter().enumerate() {
                        values.push(Value::from_row(found, j, attr.kind)?);
                    }
                    Ok(values)
                })?;
                let conflict = batch.columns.iter().zip(existing.iter()).any(|(column, value)| column[i] != *value);
                if conflict {
                    return Err(Error::StoreWriteRejected(format!(
                        "Cell {} already exists with different values", coord
                    )));
                }
            }
        }

        if inserted > 0 {
            transaction.execute("UPDATE Fragments SET cells = ?1 WHERE id = ?2", (inserted, fragment))?;
        } else {
            transaction.execute("DELETE FROM Fragments WHERE id = ?1", (fragment,))?;
        }
        transaction.commit()?;
        Ok(inserted)
    }

    /// Sets an array metadata tag.
    pub fn set_tag(&mut self, key: &str, value: &str) -> Result<()> {
        self.connection.execute(
            "INSERT INTO Tags(key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )?;
        Ok(())
    }

    /// Merges all fragments into one and returns the number of fragments before merging.
    pub fn consolidate(&mut self) -> Result<usize> {
        let fragments: usize = self.connection.query_row("SELECT COUNT(*) FROM Fragments", (), |row| row.get(0))?;
        if fragments <= 1 {
            return Ok(fragments);
        }
        log::info!("Consolidating {} fragments in {}", fragments, self.path.display());

        let transaction = self.connection.transaction()?;
        let cells: i64 = transaction.query_row("SELECT COALESCE(SUM(cells), 0) FROM Fragments", (), |row| row.get(0))?;
        transaction.execute(
            "INSERT INTO Fragments(cells, created) VALUES (?1, ?2)",
            (cells, timestamp()),
        )?;
        let merged = transaction.last_insert_rowid();
        transaction.execute("UPDATE Cells SET fragment = ?1", (merged,))?;
        transaction.execute("DELETE FROM Fragments WHERE id <> ?1", (merged,))?;
        transaction.commit()?;
        Ok(fragments)
    }

    /// Rebuilds the database file and truncates the write-ahead log.
    pub fn vacuum(&mut self) -> Result<()> {
        log::info!("Vacuuming {}", self.path.display());
        self.connection.execute_batch("VACUUM")?;
        self.connection.query_row("PRAGMA wal_checkpoint(TRUNCATE)", (), |_| Ok(()))?;
        Ok(())
    }
}

//-----------------------------------------------------------------------------

/// A read-only handle to an array, safe to share between threads.
///
/// The handle keeps idle connections in a pool.
/// Each call to [`ArrayHandle::reader`] borrows a connection, which returns to the pool when the reader is dropped.
#[derive(Debug)]
pub struct ArrayHandle {
    path: PathBuf,
    schema: ArraySchema,
    select_range_sql: String,
    domain_sql: String,
    pool: Mutex<Vec<Connection>>,
}

impl ArrayHandle {
    /// Opens the array for reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAnArray`] if the array does not exist.
    /// Passes through any database errors.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let schema = SparseArray::schema(path)?;
        let connection = Self::connect(path)?;
        Ok(ArrayHandle {
            path: path.to_path_buf(),
            select_range_sql: schema.select_range_sql(),
            domain_sql: schema.domain_sql(),
            schema,
            pool: Mutex::new(vec![connection]),
        })
    }

    fn connect(path: &Path) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection = Connection::open_with_flags(path.join(SparseArray::DATABASE), flags)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        Ok(connection)
    }

    /// Returns the path to the array.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the schema of the array.
    pub fn schema(&self) -> &ArraySchema {
        &self.schema
    }

    /// Returns the total size of the array directory in bytes.
    pub fn size_bytes(&self) -> u64 {
        utils::directory_size(&self.path)
    }

    /// Borrows a reader from the pool, opening a new connection if necessary.
    pub fn reader(&self) -> Result<ArrayReader<'_>> {
        let pooled = match self.pool.lock() {
            Ok(mut pool) => pool.pop(),
            Err(_) => None,
        };
        let connection = match pooled {
            Some(connection) => connection,
            None => Self::connect(&self.path)?,
        };
        Ok(ArrayReader { handle: self, connection: Some(connection) })
    }

    /// Closes all idle connections.
    ///
    /// Readers still in use close their connections when dropped.
    /// Calling this more than once is harmless.
    pub fn close(&self) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.clear();
        }
    }
}

/// A connection borrowed from an [`ArrayHandle`].
#[derive(Debug)]
pub struct ArrayReader<'a> {
    handle: &'a ArrayHandle,
    connection: Option<Connection>,
}

impl<'a> ArrayReader<'a> {
    fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or_else(|| Error::StoreUnavailable(self.handle.path.display().to_string()))
    }

    /// Calls `f` with every cell in the subarray in coordinate order, until `f` returns `false`.
    ///
    /// Returns the number of cells passed to `f`.
    pub fn scan<F>(&self, subarray: &Subarray, mut f: F) -> Result<usize>
        where F: FnMut(GenomicCoordinate, &[Value]) -> bool
    {
        let connection = self.connection()?;
        let attributes = &self.handle.schema.attributes;
        let mut statement = connection.prepare_cached(&self.handle.select_range_sql)?;
        let mut rows = statement.query((
            subarray.chrom.start, subarray.chrom.end,
            subarray.pos.start, subarray.pos.end,
            subarray.index.start, subarray.index.end,
        ))?;

        let mut visited = 0;
        let mut values: Vec<Value> = Vec::with_capacity(attributes.len());
        while let Some(row) = rows.next()? {
            let coord = GenomicCoordinate::new(row.get(0)?, row.get(1)?, row.get(2)?);
            values.clear();
            for (i, attr) in attributes.iter().enumerate() {
                values.push(Value::from_row(row, i + 3, attr.kind)?);
            }
            visited += 1;
            if !f(coord, &values) {
                break;
            }
        }
        Ok(visited)
    }

    /// Returns all cells in the subarray.
    pub fn read(&self, subarray: &Subarray) -> Result<Cells> {
        let attributes = &self.handle.schema.attributes;
        let mut cells = Cells {
            coordinates: Vec::new(),
            columns: vec![Vec::new(); attributes.len()],
            names: attributes.iter().map(|attr| attr.name.clone()).collect(),
        };
        self.scan(subarray, |coord, values| {
            cells.coordinates.push(coord);
            for (column, value) in cells.columns.iter_mut().zip(values.iter()) {
                column.push(value.clone());
            }
            true
        })?;
        Ok(cells)
    }

    /// Returns the bounding box of the stored cells, or [`None`] if the array is empty.
    pub fn non_empty_domain(&self) -> Result<Option<NonEmptyDomain>> {
        let connection = self.connection()?;
        query_domain(connection, &self.handle.domain_sql)
    }

    /// Returns the number of stored cells.
    pub fn cell_count(&self) -> Result<usize> {
        let connection = self.connection()?;
        let mut statement = connection.prepare_cached("SELECT COALESCE(SUM(cells), 0) FROM Fragments")?;
        let count = statement.query_row((), |row| row.get(0))?;
        Ok(count)
    }

    /// Returns the number of write fragments.
    pub fn fragment_count(&self) -> Result<usize> {
        let connection = self.connection()?;
        let mut statement = connection.prepare_cached("SELECT COUNT(*) FROM Fragments")?;
        let count = statement.query_row((), |row| row.get(0))?;
        Ok(count)
    }

    /// Returns the value of the metadata tag, or [`None`] if the tag does not exist.
    pub fn get_tag(&self, key: &str) -> Result<Option<String>> {
        let connection = self.connection()?;
        let mut statement = connection.prepare_cached("SELECT value FROM Tags WHERE key = ?1")?;
        let value = statement.query_row((key,), |row| row.get(0)).optional()?;
        Ok(value)
    }
}

impl<'a> Drop for ArrayReader<'a> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Ok(mut pool) = self.handle.pool.lock() {
                pool.push(connection);
            }
        }
    }
}

//-----------------------------------------------------------------------------
