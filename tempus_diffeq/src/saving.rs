use std::{
    fmt::Write,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use csv::Writer;

use crate::{OdeError, state::OdeState};

/// Specifies the saving strategy to be used by the solver.
///
/// - `Memory`: Save all state data in memory for postprocessing.
/// - `File`: Write `(t, state)` records incrementally to a CSV file.
/// - `None`: Disables solver-side saving (user handles it via the model).
#[derive(Debug, Clone)]
pub enum SaveMethod {
    Memory,
    File(PathBuf),
    None,
}

/// Runtime storage for solver results, selected based on the `SaveMethod`.
#[derive(Debug)]
pub enum ResultStorage<State>
where
    State: OdeState,
{
    /// In-memory storage of `(time, state)` pairs.
    Memory(MemoryResult<State>),
    /// CSV writer streaming output incrementally.
    File(StateWriter),
    /// No output storage.
    None,
}

impl<State: OdeState> ResultStorage<State> {
    /// Save a `(time, state)` pair to the result store.
    ///
    /// No-op if storage is `None`.
    pub fn save(&mut self, t: f64, y: &State) -> Result<(), OdeError> {
        match self {
            ResultStorage::Memory(result) => {
                result.insert(t, y);
                Ok(())
            }
            ResultStorage::File(writer) => writer.write(t, y),
            ResultStorage::None => Ok(()),
        }
    }

    /// Finalize and flush result storage.
    ///
    /// For `Memory`, this truncates unused buffer capacity.
    /// For `File`, this flushes the buffered writer.
    pub fn truncate(&mut self) -> Result<(), OdeError> {
        match self {
            ResultStorage::Memory(result) => {
                result.truncate();
                Ok(())
            }
            ResultStorage::File(writer) => writer.flush(),
            ResultStorage::None => Ok(()),
        }
    }
}

/// A preallocated and growable result container used for in-memory storage
/// of ODE solver outputs. Each entry stores the time and state value at that
/// time.
#[derive(Debug)]
pub struct MemoryResult<State>
where
    State: OdeState,
{
    /// Recorded times.
    pub t: Vec<f64>,
    /// Recorded states.
    pub y: Vec<State>,
    /// Current insert index.
    i: usize,
}

impl<State: OdeState> MemoryResult<State> {
    /// Constructs a new memory result buffer with an initial capacity `n`.
    pub fn new(n: usize) -> Self {
        Self {
            t: vec![0.0; n],
            y: vec![State::default(); n],
            i: 0,
        }
    }

    /// Number of saved entries.
    pub fn len(&self) -> usize {
        self.i
    }

    pub fn is_empty(&self) -> bool {
        self.i == 0
    }

    /// Inserts a new result `(t, x)` into the buffer. Automatically grows if
    /// full.
    fn insert(&mut self, t: f64, x: &State) {
        if self.i == self.t.len() {
            self.extend();
        }
        self.t[self.i] = t;
        self.y[self.i].clone_from(x);
        self.i += 1;
    }

    /// Doubles the size of the buffer to accommodate more entries.
    fn extend(&mut self) {
        let grow = self.t.len().max(8);
        self.t.extend(vec![0.0; grow]);
        self.y.extend(vec![State::default(); grow]);
    }

    /// Truncates the buffer to contain only the filled entries.
    fn truncate(&mut self) {
        self.t.truncate(self.i);
        self.y.truncate(self.i);
    }
}

/// Streams `(t, state)` records to a CSV file through a buffered writer.
///
/// The record buffer is allocated once at creation; per-step writes only
/// format into it.
pub struct StateWriter {
    writer: Writer<BufWriter<File>>,
    buffer: Vec<String>,
}

impl std::fmt::Debug for StateWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateWriter")
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

impl StateWriter {
    /// Creates the file and writes the header row: `t` followed by the
    /// state's column names.
    pub fn create<State: OdeState>(path: &Path, state: &State) -> Result<Self, OdeError> {
        let file = File::create(path)?;
        let mut writer = Writer::from_writer(BufWriter::new(file));

        let mut buffer = Vec::with_capacity(state.headers().len() + 1);
        buffer.push("t".to_string());
        buffer.extend(state.headers());
        writer.write_record(&buffer)?;

        Ok(Self { writer, buffer })
    }

    pub fn write<State: OdeState>(&mut self, t: f64, state: &State) -> Result<(), OdeError> {
        self.buffer[0].clear();
        write!(self.buffer[0], "{}", t).unwrap();
        state.format_record(&mut self.buffer[1..]);
        self.writer.write_record(&self.buffer)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), OdeError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateArray;

    #[test]
    fn test_memory_result_grows_past_preallocation() {
        let mut result = MemoryResult::<StateArray<1>>::new(2);
        for i in 0..10 {
            result.insert(i as f64, &StateArray::new([i as f64]));
        }
        result.truncate();
        assert_eq!(result.len(), 10);
        assert_eq!(result.t.len(), 10);
        assert_eq!(result.t[9], 9.0);
        assert_eq!(result.y[9][0], 9.0);
    }

    #[test]
    fn test_memory_result_from_empty_hint() {
        let mut result = MemoryResult::<StateArray<1>>::new(0);
        result.insert(0.0, &StateArray::new([1.0]));
        result.truncate();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_storage_none_is_noop() {
        let mut storage = ResultStorage::<StateArray<1>>::None;
        storage.save(0.0, &StateArray::new([1.0])).unwrap();
        storage.truncate().unwrap();
    }

    #[test]
    fn test_csv_writer_round_trip() {
        let dir = std::env::temp_dir().join("tempus_diffeq_csv_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("states.csv");

        let x = StateArray::new([1.0, -2.5]);
        let mut writer = StateWriter::create(&path, &x).unwrap();
        writer.write(0.0, &x).unwrap();
        writer.write(0.1, &StateArray::new([0.5, 0.25])).unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("t,x0,x1"));
        assert_eq!(lines.next(), Some("0,1,-2.5"));
        assert_eq!(lines.next(), Some("0.1,0.5,0.25"));
    }
}
