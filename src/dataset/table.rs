use crate::config::types::{Result, SynthError};
use crate::dataset::cell::{Cell, ColumnKind};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

/// Untyped CSV table: a header plus string records, in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl RawTable {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = csv_reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let mut records = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            records.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, records })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            SynthError::Dataset(format!("failed to open {}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.headers)?;
        for record in &self.records {
            csv_writer.write_record(record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        self.write_to(file)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Named, typed column
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// One example: inputs and expected outputs in column order
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub inputs: Vec<Cell>,
    pub outputs: Vec<Cell>,
}

/// Ordered example rows sharing one input/output schema.
///
/// Columns whose name starts with the input marker are inputs; all others are
/// expected outputs. Both keep file order.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetSplit {
    inputs: Vec<Column>,
    outputs: Vec<Column>,
    rows: Vec<Row>,
}

impl DatasetSplit {
    /// Type and partition a raw table.
    pub fn from_raw(table: &RawTable, input_marker: &str) -> Result<Self> {
        let width = table.headers.len();
        for (index, record) in table.records.iter().enumerate() {
            if record.len() != width {
                return Err(SynthError::Dataset(format!(
                    "row {} has {} fields, header has {}",
                    index,
                    record.len(),
                    width
                )));
            }
        }

        let kinds: Vec<ColumnKind> = (0..width)
            .map(|col| ColumnKind::infer(table.records.iter().map(|r| r[col].as_str())))
            .collect();

        let (input_idx, output_idx): (Vec<usize>, Vec<usize>) =
            (0..width).partition(|&col| table.headers[col].starts_with(input_marker));

        let columns = |indices: &[usize]| {
            indices
                .iter()
                .map(|&col| Column {
                    name: table.headers[col].clone(),
                    kind: kinds[col],
                })
                .collect::<Vec<_>>()
        };

        let rows = table
            .records
            .iter()
            .map(|record| Row {
                inputs: input_idx.iter().map(|&c| kinds[c].parse(&record[c])).collect(),
                outputs: output_idx.iter().map(|&c| kinds[c].parse(&record[c])).collect(),
            })
            .collect();

        Ok(Self {
            inputs: columns(&input_idx),
            outputs: columns(&output_idx),
            rows,
        })
    }

    pub fn from_reader<R: Read>(reader: R, input_marker: &str) -> Result<Self> {
        Self::from_raw(&RawTable::from_reader(reader)?, input_marker)
    }

    pub fn from_path<P: AsRef<Path>>(path: P, input_marker: &str) -> Result<Self> {
        Self::from_raw(&RawTable::from_path(path)?, input_marker)
    }

    pub fn input_columns(&self) -> &[Column] {
        &self.inputs
    }

    pub fn output_columns(&self) -> &[Column] {
        &self.outputs
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Input values per row, ready to send to a worker.
    pub fn input_matrix(&self) -> Vec<&[Cell]> {
        self.rows.iter().map(|row| row.inputs.as_slice()).collect()
    }

    /// Expected outputs per row in normalized text form.
    pub fn expected_texts(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.outputs.iter().map(Cell::normalized).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "input1,input2,output\n\"hello, world\",3,True\nabc,-1,False\n";

    #[test]
    fn partitions_columns_by_marker_in_file_order() {
        let split = DatasetSplit::from_reader(CSV.as_bytes(), "input").unwrap();
        let names: Vec<_> = split.input_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["input1", "input2"]);
        assert_eq!(split.output_columns().len(), 1);
        assert_eq!(split.output_columns()[0].kind, ColumnKind::Boolean);
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn quoted_fields_keep_commas() {
        let split = DatasetSplit::from_reader(CSV.as_bytes(), "input").unwrap();
        assert_eq!(
            split.rows()[0].inputs,
            vec![Cell::Text("hello, world".to_string()), Cell::Int(3)]
        );
        assert_eq!(split.expected_texts(), vec![vec!["True"], vec!["False"]]);
    }

    #[test]
    fn output_columns_may_interleave_with_inputs() {
        let csv = "output1,input1,output2\n1,2,x\n";
        let split = DatasetSplit::from_reader(csv.as_bytes(), "input").unwrap();
        let outputs: Vec<_> = split.output_columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(outputs, ["output1", "output2"]);
        assert_eq!(split.rows()[0].inputs, vec![Cell::Int(2)]);
    }

    #[test]
    fn ragged_rows_are_dataset_errors() {
        let table = RawTable {
            headers: vec!["input1".into(), "output".into()],
            records: vec![vec!["1".into()]],
        };
        assert!(matches!(
            DatasetSplit::from_raw(&table, "input"),
            Err(SynthError::Dataset(_))
        ));
    }

    #[test]
    fn raw_table_survives_write_and_read() {
        let table = RawTable::from_reader(CSV.as_bytes()).unwrap();
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        assert_eq!(RawTable::from_reader(buf.as_slice()).unwrap(), table);
    }
}
