//! TSPLIB file loading.
//!
//! Reads the subset of the TSPLIB format the solver consumes: the header
//! keys `NAME`, `DIMENSION` and `EDGE_WEIGHT_TYPE` followed by a
//! `NODE_COORD_SECTION` with 1-based city ids, terminated by `EOF` or the
//! end of the file.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::time::Instant;

use log::info;

use crate::{DistanceType, Error, Tsp};

/// Loads a TSPLIB instance from `path`.
pub fn load_tsp(path: impl AsRef<Path>) -> Result<Tsp, Error> {
    let file = File::open(path.as_ref())?;
    let start = Instant::now();
    let tsp = parse_tsp(file)?;
    info!(
        "Loaded TSP '{}' ({} cities, {}) in {:?}",
        tsp.name,
        tsp.city_count(),
        tsp.distance_type,
        start.elapsed()
    );
    Ok(tsp)
}

/// Parses a TSPLIB instance from any reader.
pub fn parse_tsp(input: impl Read) -> Result<Tsp, Error> {
    let reader = BufReader::new(input);

    let mut name = String::new();
    let mut dimension = 0usize;
    let mut distance_type = None;
    let mut coords: Vec<(f64, f64)> = Vec::new();
    let mut in_coords = false;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        let line_no = index + 1;

        if line.is_empty() {
            continue;
        }
        if line == "EOF" {
            break;
        }

        if !in_coords {
            if let Some(value) = header_value(line, "NAME") {
                name = value.to_string();
            } else if let Some(value) = header_value(line, "DIMENSION") {
                dimension = value.parse().map_err(|_| Error::ParseError {
                    line: line_no,
                    message: format!("invalid DIMENSION value '{value}'"),
                })?;
            } else if let Some(value) = header_value(line, "EDGE_WEIGHT_TYPE") {
                distance_type = Some(value.parse::<DistanceType>()?);
            } else if line == "NODE_COORD_SECTION" {
                if dimension == 0 {
                    return Err(Error::ParseError {
                        line: line_no,
                        message: "NODE_COORD_SECTION before DIMENSION".to_string(),
                    });
                }
                coords.resize(dimension, (0.0, 0.0));
                in_coords = true;
            }
            continue;
        }

        let mut fields = line.split_whitespace();
        let parsed = (|| {
            let id: usize = fields.next()?.parse().ok()?;
            let x: f64 = fields.next()?.parse().ok()?;
            let y: f64 = fields.next()?.parse().ok()?;
            Some((id, x, y))
        })();
        let (id, x, y) = parsed.ok_or_else(|| Error::ParseError {
            line: line_no,
            message: format!("invalid coordinate line '{line}'"),
        })?;
        if id < 1 || id > dimension {
            return Err(Error::ParseError {
                line: line_no,
                message: format!("city id {id} out of range 1..={dimension}"),
            });
        }
        coords[id - 1] = (x, y);
    }

    let distance_type = distance_type.ok_or_else(|| Error::ParseError {
        line: 0,
        message: "missing EDGE_WEIGHT_TYPE".to_string(),
    })?;
    if !in_coords || dimension == 0 {
        return Err(Error::ParseError {
            line: 0,
            message: "missing NODE_COORD_SECTION".to_string(),
        });
    }

    Ok(Tsp::from_coords(name, distance_type, &coords))
}

/// Splits `KEY : value` / `KEY: value` header lines.
fn header_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(key)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix(':')?;
    Some(rest.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SQUARE: &str = "NAME : square4\n\
                          COMMENT : unit test instance\n\
                          TYPE : TSP\n\
                          DIMENSION : 4\n\
                          EDGE_WEIGHT_TYPE : EUC_2D\n\
                          NODE_COORD_SECTION\n\
                          1 0.0 0.0\n\
                          2 0.0 10.0\n\
                          3 10.0 10.0\n\
                          4 10.0 0.0\n\
                          EOF\n";

    #[test]
    fn parses_a_minimal_instance() {
        let tsp = parse_tsp(SQUARE.as_bytes()).unwrap();
        assert_eq!(tsp.name, "square4");
        assert_eq!(tsp.city_count(), 4);
        assert_eq!(tsp.distance_type, DistanceType::Euc2d);
        assert_eq!(tsp.weight(0, 1), 10);
        assert_eq!(tsp.weight(0, 2), 14);
    }

    #[test]
    fn loads_from_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SQUARE.as_bytes()).unwrap();
        let tsp = load_tsp(file.path()).unwrap();
        assert_eq!(tsp.city_count(), 4);
    }

    #[test]
    fn rejects_unknown_weight_type() {
        let input = "NAME : bad\nDIMENSION : 2\nEDGE_WEIGHT_TYPE : GEO\nNODE_COORD_SECTION\n1 0 0\n2 1 1\nEOF\n";
        match parse_tsp(input.as_bytes()) {
            Err(Error::UnsupportedWeightType(t)) => assert_eq!(t, "GEO"),
            Err(other) => panic!("expected UnsupportedWeightType, got {other}"),
            Ok(_) => panic!("expected UnsupportedWeightType, got an instance"),
        }
    }

    #[test]
    fn rejects_out_of_range_ids() {
        let input = "NAME : bad\nDIMENSION : 2\nEDGE_WEIGHT_TYPE : EUC_2D\nNODE_COORD_SECTION\n1 0 0\n5 1 1\nEOF\n";
        assert!(matches!(
            parse_tsp(input.as_bytes()),
            Err(Error::ParseError { .. })
        ));
    }
}
