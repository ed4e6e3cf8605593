//! Read-only lookup of reactant (propellant) records.

use std::collections::HashMap;
use thiserror::Error;

/// cal/g -> J/g.
const CAL_TO_JOULE: f64 = 4.1868;
/// lb/in^3 -> g/cm^3.
const LB_IN3_TO_G_CM3: f64 = 27.679905;

/// A propellant reactant: name, up to 6 (element, stoich-coef) pairs,
/// heat of formation (J/g) and density (g/cm^3).
#[derive(Debug, Clone, PartialEq)]
pub struct Reactant {
    pub name: String,
    pub elements: Vec<(String, f64)>,
    pub heat_of_formation: f64,
    pub density: f64,
}

#[derive(Error, Debug)]
pub enum PropellantDbError {
    #[error("I/O error reading propellant database: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed propellant record on line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("continuation line ('+') with no preceding record at line {0}")]
    DanglingContinuation(usize),
}

#[derive(Debug, Clone, Default)]
pub struct PropellantDB {
    reactants: Vec<Reactant>,
    index: HashMap<String, usize>,
}

impl PropellantDB {
    pub fn new(reactants: Vec<Reactant>) -> Self {
        let index = reactants
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.clone(), i))
            .collect();
        Self { reactants, index }
    }

    pub fn len(&self) -> usize {
        self.reactants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reactants.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Reactant {
        &self.reactants[idx]
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Load a propellant database. One record per line; lines starting
    /// with `'*'` are comments, lines starting with `'+'` continue the
    /// name of the previous record (§6).
    pub fn load(text: &str) -> Result<Self, PropellantDbError> {
        let mut reactants: Vec<Reactant> = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.is_empty() || line.starts_with('*') {
                continue;
            }
            if line.starts_with('+') {
                let last = reactants
                    .last_mut()
                    .ok_or(PropellantDbError::DanglingContinuation(lineno + 1))?;
                last.name.push_str(line[1..].trim());
                continue;
            }
            reactants.push(parse_reactant_record(line, lineno + 1)?);
        }
        Ok(Self::new(reactants))
    }
}

fn field(line: &str, lo: usize, hi: usize) -> String {
    let len = line.len();
    if lo >= len {
        return String::new();
    }
    line[lo..hi.min(len)].trim().to_string()
}

fn parse_reactant_record(line: &str, lineno: usize) -> Result<Reactant, PropellantDbError> {
    let err = |message: String| PropellantDbError::Malformed {
        line: lineno,
        message,
    };
    let name = field(line, 9, 39);
    if name.is_empty() {
        return Err(err("empty reactant name".into()));
    }

    let mut elements = Vec::with_capacity(6);
    for slot in 0..6 {
        let base = 39 + slot * 5;
        let coef_raw = field(line, base, base + 3);
        let symbol = field(line, base + 3, base + 5);
        if symbol.is_empty() {
            continue;
        }
        let coef: f64 = coef_raw
            .parse()
            .map_err(|_| err(format!("unreadable coefficient for element '{}'", symbol)))?;
        if coef != 0.0 {
            elements.push((symbol, coef));
        }
    }

    let heat_cal_per_g: f64 = field(line, 69, 74)
        .parse()
        .map_err(|_| err("unreadable heat of formation".into()))?;
    let density_lb_in3: f64 = field(line, 75, 80)
        .parse()
        .map_err(|_| err("unreadable density".into()))?;

    Ok(Reactant {
        name,
        elements,
        heat_of_formation: heat_cal_per_g * CAL_TO_JOULE,
        density: density_lb_in3 * LB_IN3_TO_G_CM3,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_line() -> String {
        let mut s = String::new();
        s.push_str(&" ".repeat(9));
        s.push_str(&format!("{:<30}", "AL(cr)"));
        s.push_str(&format!("{:>3}{:<2}", "1", "AL"));
        s.push_str(&" ".repeat(5 * 5));
        while s.len() < 69 {
            s.push(' ');
        }
        s.push_str(&format!("{:>5}", "0"));
        s.push(' ');
        s.push_str(&format!("{:>5}", "0.097"));
        s
    }

    #[test]
    fn parses_single_element_reactant() {
        let line = sample_line();
        let r = parse_reactant_record(&line, 1).expect("should parse");
        assert_eq!(r.name, "AL(cr)");
        assert_eq!(r.elements, vec![("AL".to_string(), 1.0)]);
        assert_relative_eq!(r.density, 0.097 * LB_IN3_TO_G_CM3, epsilon = 1e-9);
    }

    #[test]
    fn continuation_line_extends_previous_name() {
        let text = format!("{}\n+EXTRA\n", sample_line());
        let db = PropellantDB::load(&text).expect("should parse");
        assert_eq!(db.len(), 1);
        assert_eq!(db.get(0).name, "AL(cr)EXTRA");
    }

    #[test]
    fn comment_lines_are_skipped() {
        let text = format!("* a comment\n{}\n", sample_line());
        let db = PropellantDB::load(&text).expect("should parse");
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn dangling_continuation_is_an_error() {
        let err = PropellantDB::load("+nope\n").unwrap_err();
        assert!(matches!(err, PropellantDbError::DanglingContinuation(1)));
    }
}
