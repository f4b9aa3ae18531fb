//! Reading and cleaning lists of observed feature masses
use std::io::{self, BufRead};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MassListError {
    #[error("An IO error occurred: {0}")]
    IOError(
        #[source]
        #[from]
        io::Error,
    ),
    #[error("Failed to read mass list: {0}")]
    CsvError(
        #[source]
        #[from]
        csv::Error,
    ),
    #[error("Malformed mass on line {line}: {value:?}")]
    MalformedRow { line: u64, value: String },
    #[error("The mass list did not contain any masses")]
    Empty,
}

/// Round `value` to `precision` decimal places.
///
/// Rounds the exact stored binary value, so `0.01015` (stored as
/// `0.0101499...`) becomes `0.0101`.
pub fn round_to(value: f64, precision: i32) -> f64 {
    if precision < 0 || !value.is_finite() {
        let scale = 10f64.powi(precision);
        return (value * scale).round() / scale;
    }
    format!("{:.*}", precision as usize, value)
        .parse()
        .unwrap_or(value)
}

/// The absolute mass error allowed around `mass` at `ppm` parts per million,
/// rounded to four decimal places.
pub fn calculate_error(mass: f64, ppm: f64) -> f64 {
    calculate_error_with_precision(mass, ppm, 4)
}

pub fn calculate_error_with_precision(mass: f64, ppm: f64, precision: i32) -> f64 {
    round_to((mass * ppm) / 1e6, precision)
}

/// Drop masses that fall within the error tolerance of an earlier mass.
///
/// Masses are visited in their original order and the first member of every
/// tolerance cluster is retained. The tolerance is computed from the candidate
/// mass, not the accepted one.
pub fn remove_mass_duplicates(masses: &[f64], ppm: f64) -> Vec<f64> {
    let mut accepted: Vec<f64> = Vec::with_capacity(masses.len());
    for mass in masses.iter().copied() {
        let tol = calculate_error(mass, ppm);
        let is_duplicate = accepted
            .iter()
            .any(|kept| (mass - tol) <= *kept && *kept <= (mass + tol));
        if !is_duplicate {
            accepted.push(mass);
        }
    }
    if accepted.len() != masses.len() {
        debug!(
            "Removed {} duplicate masses at {ppm} ppm",
            masses.len() - accepted.len()
        );
    }
    accepted
}

/// Read a mass list, one mass per row in the first column.
///
/// The first line is always treated as a header and skipped, even when blank.
pub fn read_mass_list<R: io::Read>(reader: R) -> Result<Vec<f64>, MassListError> {
    let mut reader = io::BufReader::new(reader);
    let mut header = String::new();
    reader.read_line(&mut header)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut masses = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(value) = record.get(0) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        match value.parse::<f64>() {
            Ok(mass) => masses.push(mass),
            Err(_) => {
                return Err(MassListError::MalformedRow {
                    line: record.position().map(|p| p.line() + 1).unwrap_or_default(),
                    value: value.to_string(),
                })
            }
        }
    }
    if masses.is_empty() {
        return Err(MassListError::Empty);
    }
    Ok(masses)
}

#[cfg(test)]
mod test {
    use super::*;

    const MASSES: [f64; 8] = [
        420.1421, 422.1585, 438.1752, 440.133, 454.1481, 474.2021, 491.0763, 492.213,
    ];

    #[test]
    fn test_calculate_error() {
        assert_eq!(calculate_error(420.1421, 10.0), 0.0042);
        assert_eq!(calculate_error(1000.0, 5.0), 0.005);
        assert_eq!(calculate_error_with_precision(420.1421, 10.0, 6), 0.004201);
        assert_eq!(calculate_error_with_precision(420.1421, 10.0, 2), 0.0);
    }

    #[test]
    fn test_calculate_error_rounds_stored_value() {
        // 1015 * 10 / 1e6 is stored just below 0.01015
        assert_eq!(calculate_error(1015.0, 10.0), 0.0101);
        assert_eq!(calculate_error(575.0, 10.0), 0.0057);
        assert_eq!(round_to(2.675, 2), 2.67);
    }

    #[test]
    fn test_no_duplicates_unchanged() {
        let result = remove_mass_duplicates(&MASSES, 10.0);
        assert_eq!(result, MASSES.to_vec());
    }

    #[test]
    fn test_duplicates_removed_keep_first() {
        let result = remove_mass_duplicates(&MASSES, 5000.0);
        assert_eq!(
            result,
            vec![420.1421, 438.1752, 454.1481, 474.2021, 491.0763]
        );

        let result = remove_mass_duplicates(&[300.0, 300.001, 299.999, 301.0], 10.0);
        assert_eq!(result, vec![300.0, 301.0]);
    }

    #[test]
    fn test_read_mass_list() -> Result<(), MassListError> {
        let text = "mass\n420.1421\n438.1752\n\n454.1481,extra\n";
        let masses = read_mass_list(text.as_bytes())?;
        assert_eq!(masses, vec![420.1421, 438.1752, 454.1481]);

        // The header row is skipped even when it holds a number
        let masses = read_mass_list("100.0\n200.0\n".as_bytes())?;
        assert_eq!(masses, vec![200.0]);

        // Only the first physical line is dropped, blank or not
        let masses = read_mass_list("\n100.0\n200.0\n".as_bytes())?;
        assert_eq!(masses, vec![100.0, 200.0]);
        let masses = read_mass_list("mass\r\n100.0\r\n".as_bytes())?;
        assert_eq!(masses, vec![100.0]);
        Ok(())
    }

    #[test]
    fn test_read_mass_list_malformed() {
        match read_mass_list("mass\n420.1421\nabc\n".as_bytes()) {
            Err(MassListError::MalformedRow { line, value }) => {
                assert_eq!(line, 3);
                assert_eq!(value, "abc");
            }
            other => panic!("Expected malformed row, got {other:?}"),
        }
        assert!(matches!(
            read_mass_list("mass\n".as_bytes()),
            Err(MassListError::Empty)
        ));
    }
}
