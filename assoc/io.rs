//! # Tab-Separated Input and Output
//!
//! All tables are tab-delimited with a header row and one sample identifier per
//! row or column:
//!
//! - sample matrix: `sample  <feature>...`, one row per sample, 0/1 cells
//! - phenotype: `sample  phenotype`, 0/1 cells
//! - k-mers: `kmer  <sample>...`, one row per k-mer, 0/1 cells
//! - coordinates: `sample  MDS1 ... MDSk`
//! - results: `kmer  frequency  beta  standard_error  p_value  comments`

use crate::structure::{MdsEmbedding, SampleMatrix, StructureError};
use crate::types::{AssocError, Kmer, Phenotype};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use ndarray::{Array1, Array2};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read or write TSV: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Structure(#[from] StructureError),

    #[error(transparent)]
    Assoc(#[from] AssocError),

    #[error("{path}: the header has no data columns.")]
    EmptyHeader { path: PathBuf },

    #[error("{path}, line {line}: could not parse '{value}' in column '{column}'.")]
    Parse {
        path: PathBuf,
        line: u64,
        column: String,
        value: String,
    },

    #[error("{path}: sample '{sample}' from the phenotype file is missing.")]
    MissingSample { path: PathBuf, sample: String },

    #[error("{path}: sample '{sample}' has no phenotype.")]
    UnknownSample { path: PathBuf, sample: String },

    #[error("{path}: sample '{sample}' is listed more than once.")]
    DuplicateSample { path: PathBuf, sample: String },
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, IoError> {
    Ok(ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)?)
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map_or(0, |p| p.line())
}

fn parse_binary(
    path: &Path,
    record: &StringRecord,
    column: &str,
    raw: &str,
) -> Result<u8, IoError> {
    match raw.trim() {
        "0" => Ok(0),
        "1" => Ok(1),
        other => Err(IoError::Parse {
            path: path.to_path_buf(),
            line: line_of(record),
            column: column.to_string(),
            value: other.to_string(),
        }),
    }
}

fn parse_float(path: &Path, record: &StringRecord, column: &str, raw: &str) -> Result<f64, IoError> {
    raw.trim().parse::<f64>().map_err(|_| IoError::Parse {
        path: path.to_path_buf(),
        line: line_of(record),
        column: column.to_string(),
        value: raw.to_string(),
    })
}

/// Reads a binary sample-by-feature matrix. Returns sample names in file order.
pub fn read_sample_matrix(path: &Path) -> Result<(Vec<String>, SampleMatrix), IoError> {
    let mut reader = tsv_reader(path)?;
    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(IoError::EmptyHeader {
            path: path.to_path_buf(),
        });
    }

    let mut samples = Vec::new();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        samples.push(record.get(0).unwrap_or_default().to_string());
        let row = record
            .iter()
            .zip(headers.iter())
            .skip(1)
            .map(|(raw, column)| parse_binary(path, &record, column, raw))
            .collect::<Result<Vec<u8>, _>>()?;
        rows.push(row);
    }
    check_unique(path, &samples)?;

    let matrix = SampleMatrix::from_rows(&rows)?;
    log::info!(
        "Read {} samples x {} features from {}",
        matrix.n_samples(),
        matrix.n_features(),
        path.display()
    );
    Ok((samples, matrix))
}

/// Reads sample names and their binary phenotype.
pub fn read_phenotype(path: &Path) -> Result<(Vec<String>, Phenotype), IoError> {
    let mut reader = tsv_reader(path)?;
    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(IoError::EmptyHeader {
            path: path.to_path_buf(),
        });
    }
    let column = headers.get(1).unwrap_or("phenotype").to_string();

    let mut samples = Vec::new();
    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        samples.push(record.get(0).unwrap_or_default().to_string());
        let raw = record.get(1).unwrap_or_default();
        values.push(f64::from(parse_binary(path, &record, &column, raw)?));
    }
    check_unique(path, &samples)?;

    let phenotype = Phenotype::new(Array1::from(values))?;
    log::info!(
        "Read phenotype for {} samples ({:.1}% cases) from {}",
        phenotype.len(),
        100.0 * phenotype.mean(),
        path.display()
    );
    Ok((samples, phenotype))
}

/// Reads k-mer presence rows, reordering columns to `sample_order`. The header
/// must name exactly the samples in `sample_order`.
pub fn read_kmers(path: &Path, sample_order: &[String]) -> Result<Vec<Kmer>, IoError> {
    let mut reader = tsv_reader(path)?;
    let headers = reader.headers()?.clone();
    let header_names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
    check_unique(path, &header_names)?;
    let known: HashSet<&str> = sample_order.iter().map(String::as_str).collect();
    if let Some(unknown) = header_names.iter().find(|n| !known.contains(n.as_str())) {
        return Err(IoError::UnknownSample {
            path: path.to_path_buf(),
            sample: unknown.clone(),
        });
    }
    let columns = column_indices(path, &header_names, sample_order, 1)?;

    let mut kmers = Vec::new();
    for record in reader.records() {
        let record = record?;
        let sequence = record.get(0).unwrap_or_default();
        let presence = columns
            .iter()
            .zip(sample_order)
            .map(|(&col, sample)| {
                parse_binary(path, &record, sample, record.get(col).unwrap_or_default())
            })
            .collect::<Result<Vec<u8>, _>>()?;
        kmers.push(Kmer::new(sequence, &presence)?);
    }
    log::info!("Read {} k-mers from {}", kmers.len(), path.display());
    Ok(kmers)
}

/// Reads a coordinate table, reordering rows to `sample_order`.
pub fn read_coordinates(path: &Path, sample_order: &[String]) -> Result<Array2<f64>, IoError> {
    let mut reader = tsv_reader(path)?;
    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(IoError::EmptyHeader {
            path: path.to_path_buf(),
        });
    }
    let dims = headers.len() - 1;

    let mut by_sample: HashMap<String, Vec<f64>> = HashMap::new();
    for record in reader.records() {
        let record = record?;
        let sample = record.get(0).unwrap_or_default().to_string();
        let row = record
            .iter()
            .zip(headers.iter())
            .skip(1)
            .map(|(raw, column)| parse_float(path, &record, column, raw))
            .collect::<Result<Vec<f64>, _>>()?;
        if by_sample.insert(sample.clone(), row).is_some() {
            return Err(IoError::DuplicateSample {
                path: path.to_path_buf(),
                sample,
            });
        }
    }

    let mut coordinates = Array2::<f64>::zeros((sample_order.len(), dims));
    for (i, sample) in sample_order.iter().enumerate() {
        let row = by_sample.get(sample).ok_or_else(|| IoError::MissingSample {
            path: path.to_path_buf(),
            sample: sample.clone(),
        })?;
        for (j, &value) in row.iter().enumerate().take(dims) {
            coordinates[[i, j]] = value;
        }
    }
    Ok(coordinates)
}

pub fn write_coordinates(
    path: &Path,
    samples: &[String],
    embedding: &MdsEmbedding,
) -> Result<(), IoError> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    let mut header = vec!["sample".to_string()];
    header.extend((1..=embedding.dimensions()).map(|d| format!("MDS{d}")));
    writer.write_record(&header)?;

    for (sample, row) in samples.iter().zip(embedding.coordinates.rows()) {
        let mut record = vec![sample.clone()];
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes one row per fitted k-mer. Numeric cells are empty for failed fits.
pub fn write_results(path: &Path, kmers: &[Kmer]) -> Result<(), IoError> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record([
        "kmer",
        "frequency",
        "beta",
        "standard_error",
        "p_value",
        "comments",
    ])?;

    let cell = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
    for kmer in kmers {
        let comments = kmer
            .comments()
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",");
        writer.write_record([
            kmer.sequence().to_string(),
            format!("{:.4}", kmer.frequency()),
            cell(kmer.beta()),
            cell(kmer.standard_error()),
            kmer.p_value().map(|p| format!("{p:.3e}")).unwrap_or_default(),
            comments,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn check_unique(path: &Path, names: &[String]) -> Result<(), IoError> {
    let mut seen = HashSet::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(IoError::DuplicateSample {
                path: path.to_path_buf(),
                sample: name.clone(),
            });
        }
    }
    Ok(())
}

/// Position in the record of each sample in `sample_order`.
fn column_indices(
    path: &Path,
    header_names: &[String],
    sample_order: &[String],
    offset: usize,
) -> Result<Vec<usize>, IoError> {
    let position: HashMap<&str, usize> = header_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i + offset))
        .collect();
    sample_order
        .iter()
        .map(|sample| {
            position
                .get(sample.as_str())
                .copied()
                .ok_or_else(|| IoError::MissingSample {
                    path: path.to_path_buf(),
                    sample: sample.clone(),
                })
        })
        .collect()
}
