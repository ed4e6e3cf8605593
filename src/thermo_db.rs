//! Read-only lookup of species thermodynamic data.
//!
//! Evaluates H°/R, S°/R, Cp°/R, G°/R at a given temperature from NASA
//! 9-coefficient polynomials (NASA RP-1311). Loading is a one-time,
//! fixed-column text parse (§6); afterwards the database is immutable and
//! shared (`Rc`) across cases, the way the teacher shares `Rc<E>`.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Gas constant, J/(mol·K).
pub const GAS_CONSTANT: f64 = 8.314462618;

/// Bar per standard atmosphere. Species thermo data is tabulated against a
/// 1 bar reference state, but case pressures are carried in atm, so the
/// pressure term of the chemical potential needs this conversion before
/// the log is taken.
pub const BAR_PER_ATM: f64 = 1.01325;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Gas,
    Condensed,
}

/// One contiguous temperature range of a NASA 9-coefficient polynomial.
#[derive(Debug, Clone, Copy)]
pub struct TemperatureInterval {
    pub t_lo: f64,
    pub t_hi: f64,
    pub a: [f64; 7],
    pub b: [f64; 2],
}

/// Either a set of NASA 9-coefficient intervals, or (for `nint == 0`
/// records) a single assigned enthalpy at a reference temperature.
#[derive(Debug, Clone)]
pub enum ThermoData {
    Polynomial(Vec<TemperatureInterval>),
    SingleTemperature {
        enthalpy: f64,
        reference_temperature: f64,
    },
}

/// A thermo record: identity, phase, formula, and thermodynamic data.
#[derive(Debug, Clone)]
pub struct Species {
    pub name: String,
    pub id: String,
    pub phase: Phase,
    /// (element symbol, stoichiometric coefficient) pairs, at most 5.
    pub elements: Vec<(String, f64)>,
    pub molecular_weight: f64,
    /// Heat of formation at 298.15 K, J/mol.
    pub heat_of_formation: f64,
    pub data: ThermoData,
}

impl Species {
    fn interval_for(&self, t: f64) -> Option<&TemperatureInterval> {
        match &self.data {
            ThermoData::Polynomial(intervals) => {
                if intervals.is_empty() {
                    return None;
                }
                if t < intervals[0].t_lo {
                    return Some(&intervals[0]);
                }
                let last = intervals.last().unwrap();
                if t >= last.t_hi {
                    return Some(last);
                }
                intervals
                    .iter()
                    .find(|iv| t >= iv.t_lo && t < iv.t_hi)
                    .or(Some(last))
            }
            ThermoData::SingleTemperature { .. } => None,
        }
    }

    /// Dimensionless H°/RT.
    pub fn enthalpy0(&self, t: f64) -> f64 {
        match self.interval_for(t) {
            Some(iv) => {
                let a = &iv.a;
                -a[0] / t.powi(2) + a[1] * t.ln() / t + a[2] + a[3] * t / 2.0 + a[4] * t.powi(2)
                    / 3.0
                    + a[5] * t.powi(3) / 4.0
                    + a[6] * t.powi(4) / 5.0
                    + iv.b[0] / t
            }
            None => match &self.data {
                ThermoData::SingleTemperature {
                    enthalpy,
                    reference_temperature,
                } => enthalpy / (GAS_CONSTANT * reference_temperature),
                ThermoData::Polynomial(_) => 0.0,
            },
        }
    }

    /// Dimensionless S°/R.
    pub fn entropy0(&self, t: f64) -> f64 {
        match self.interval_for(t) {
            Some(iv) => {
                let a = &iv.a;
                -a[0] / (2.0 * t.powi(2)) - a[1] / t + a[2] * t.ln() + a[3] * t
                    + a[4] * t.powi(2) / 2.0
                    + a[5] * t.powi(3) / 3.0
                    + a[6] * t.powi(4) / 4.0
                    + iv.b[1]
            }
            None => 0.0,
        }
    }

    /// Dimensionless Cp°/R.
    pub fn cp0(&self, t: f64) -> f64 {
        match self.interval_for(t) {
            Some(iv) => {
                let a = &iv.a;
                a[0] / t.powi(2) + a[1] / t + a[2] + a[3] * t + a[4] * t.powi(2)
                    + a[5] * t.powi(3)
                    + a[6] * t.powi(4)
            }
            None => 0.0,
        }
    }

    /// Dimensionless G°/RT.
    pub fn gibbs0(&self, t: f64) -> f64 {
        self.enthalpy0(t) - self.entropy0(t)
    }

    /// True iff `t` lies strictly inside the union of this species'
    /// temperature ranges. Single-temperature records are never "in range"
    /// (they have none to be checked against).
    pub fn temperature_check(&self, t: f64) -> bool {
        match &self.data {
            ThermoData::Polynomial(intervals) => {
                intervals.iter().any(|iv| t >= iv.t_lo && t < iv.t_hi)
            }
            ThermoData::SingleTemperature { .. } => false,
        }
    }

    /// Whichever of the lowest/highest range bound is nearer to `t`.
    pub fn transition_temperature(&self, t: f64) -> f64 {
        match &self.data {
            ThermoData::Polynomial(intervals) if !intervals.is_empty() => {
                let lo = intervals[0].t_lo;
                let hi = intervals.last().unwrap().t_hi;
                if (t - lo).abs() <= (hi - t).abs() {
                    lo
                } else {
                    hi
                }
            }
            ThermoData::Polynomial(_) => t,
            ThermoData::SingleTemperature {
                reference_temperature,
                ..
            } => *reference_temperature,
        }
    }

    /// Chemical potential μ/RT. For gas species, includes the mixture and
    /// pressure contributions; for condensed species it is simply G°/RT.
    pub fn chemical_potential(
        &self,
        t: f64,
        n_species: f64,
        n_gas_total: f64,
        pressure_atm: f64,
    ) -> f64 {
        match self.phase {
            Phase::Gas => {
                let ln_mole_fraction = if n_species > 0.0 {
                    (n_species / n_gas_total).ln()
                } else {
                    f64::NEG_INFINITY
                };
                self.gibbs0(t) + ln_mole_fraction + (pressure_atm * BAR_PER_ATM).ln()
            }
            Phase::Condensed => self.gibbs0(t),
        }
    }
}

#[derive(Error, Debug)]
pub enum ThermoDbError {
    #[error("I/O error reading thermo database: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed thermo record on line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// Immutable, read-only lookup of thermo records, shared across cases.
#[derive(Debug, Clone, Default)]
pub struct ThermoDB {
    species: Vec<Species>,
    index: HashMap<String, usize>,
}

impl ThermoDB {
    pub fn new(species: Vec<Species>) -> Self {
        let index = species
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();
        Self { species, index }
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn get(&self, idx: usize) -> &Species {
        &self.species[idx]
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Species)> {
        self.species.iter().enumerate()
    }

    /// Load a thermo database from NASA 9-coefficient fixed-column text
    /// (§6). Comment lines start with `' '`, `'!'` or `'-'`.
    pub fn load_nasa9(text: &str) -> Result<Self, ThermoDbError> {
        let lines: Vec<&str> = text.lines().collect();
        let mut species = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            if is_comment(line) || line.trim().is_empty() {
                i += 1;
                continue;
            }
            if line.trim_start().starts_with("END") || line.trim_start().starts_with("thermo") {
                i += 1;
                continue;
            }
            let (record, consumed) = parse_species_record(&lines, i)?;
            species.push(record);
            i += consumed;
        }
        apply_heat_of_formation_fallback(&mut species);
        Ok(Self::new(species))
    }
}

fn is_comment(line: &str) -> bool {
    matches!(line.chars().next(), Some(' ') | Some('!') | Some('-'))
}

fn field(line: &str, lo: usize, hi: usize) -> String {
    let padded_len = line.len();
    if lo >= padded_len {
        return String::new();
    }
    let hi = hi.min(padded_len);
    line[lo..hi].trim().to_string()
}

/// Parses a Fortran-style float literal, accepting both `E` and `D` exponent
/// markers (`thermo.inp`-style databases use `D`).
fn parse_fortran_float(raw: &str) -> Result<f64, std::num::ParseFloatError> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(0.0);
    }
    let normalized = s.replace('D', "E").replace('d', "e");
    normalized.parse::<f64>()
}

fn parse_species_record(lines: &[&str], start: usize) -> Result<(Species, usize), ThermoDbError> {
    let header = lines[start];
    let err = |message: String| ThermoDbError::Malformed {
        line: start + 1,
        message,
    };

    let name = field(header, 0, 18);
    let nint_field = field(header, 73, 75);
    let nint: usize = nint_field
        .parse()
        .map_err(|_| err(format!("unreadable interval count '{}'", nint_field)))?;
    let id = field(header, 75, 81);
    let state_char = header.chars().nth(81).unwrap_or('0');
    let phase = if state_char == '0' {
        Phase::Gas
    } else {
        Phase::Condensed
    };
    let weight: f64 = parse_fortran_float(&field(header, 82, 95))
        .map_err(|_| err("unreadable molecular weight".into()))?;
    let heat_of_formation: f64 = parse_fortran_float(&field(header, 95, 108))
        .map_err(|_| err("unreadable heat of formation".into()))?;

    // element composition lives in the comments band [18..73): pairs of
    // (2-char symbol, 5-char count) are not column-stable across vendored
    // databases, so we scan the comment band token-wise instead.
    let elements = parse_elements_band(&field(header, 18, 73));

    let mut consumed = 1;
    if nint == 0 {
        let t_line = lines
            .get(start + 1)
            .ok_or_else(|| err("missing reference-temperature line".into()))?;
        let reference_temperature = parse_fortran_float(&field(t_line, 1, 11))
            .map_err(|_| err("unreadable reference temperature".into()))?;
        consumed += 1;
        return Ok((
            Species {
                name,
                id,
                phase,
                elements,
                molecular_weight: weight,
                heat_of_formation,
                data: ThermoData::SingleTemperature {
                    enthalpy: heat_of_formation,
                    reference_temperature,
                },
            },
            consumed,
        ));
    }

    let mut intervals = Vec::with_capacity(nint);
    for _ in 0..nint {
        let l1 = lines
            .get(start + consumed)
            .ok_or_else(|| err("missing interval range line".into()))?;
        let t_lo = parse_fortran_float(&field(l1, 1, 11))
            .map_err(|_| err("unreadable interval lower bound".into()))?;
        let t_hi = parse_fortran_float(&field(l1, 11, 21))
            .map_err(|_| err("unreadable interval upper bound".into()))?;

        let l2 = lines
            .get(start + consumed + 1)
            .ok_or_else(|| err("missing coefficient line 1".into()))?;
        let l3 = lines
            .get(start + consumed + 2)
            .ok_or_else(|| err("missing coefficient line 2".into()))?;

        let mut a = [0.0; 7];
        for (k, slot) in a.iter_mut().take(5).enumerate() {
            let lo = k * 16;
            *slot = parse_fortran_float(&field(l2, lo, lo + 16))
                .map_err(|_| err(format!("unreadable coefficient a{}", k)))?;
        }
        a[5] = parse_fortran_float(&field(l3, 0, 16))
            .map_err(|_| err("unreadable coefficient a5".into()))?;
        a[6] = parse_fortran_float(&field(l3, 16, 32))
            .map_err(|_| err("unreadable coefficient a6".into()))?;
        let b1 = parse_fortran_float(&field(l3, 48, 64))
            .map_err(|_| err("unreadable integration constant b1".into()))?;
        let b2 = parse_fortran_float(&field(l3, 64, 80))
            .map_err(|_| err("unreadable integration constant b2".into()))?;

        intervals.push(TemperatureInterval {
            t_lo,
            t_hi,
            a,
            b: [b1, b2],
        });
        consumed += 3;
    }

    Ok((
        Species {
            name,
            id,
            phase,
            elements,
            molecular_weight: weight,
            heat_of_formation,
            data: ThermoData::Polynomial(intervals),
        },
        consumed,
    ))
}

/// Scans a free-form "ELEM  count ELEM  count ..." band for up to 5
/// (symbol, coefficient) pairs.
fn parse_elements_band(band: &str) -> Vec<(String, f64)> {
    let tokens: Vec<&str> = band.split_whitespace().collect();
    let mut pairs = Vec::new();
    let mut i = 0;
    while i + 1 < tokens.len() && pairs.len() < 5 {
        let symbol = tokens[i];
        if symbol.chars().next().map(|c| c.is_alphabetic()) != Some(true) {
            i += 1;
            continue;
        }
        if let Ok(count) = parse_fortran_float(tokens[i + 1]) {
            if count != 0.0 {
                pairs.push((symbol.to_string(), count));
            }
            i += 2;
        } else {
            i += 1;
        }
    }
    pairs
}

/// "If Heat is 0 and formula equals previous record, inherit previous
/// Heat" — preserved exactly as a database-content-specific quirk.
fn apply_heat_of_formation_fallback(species: &mut [Species]) {
    for i in 1..species.len() {
        if species[i].heat_of_formation == 0.0 && species[i].elements == species[i - 1].elements {
            species[i].heat_of_formation = species[i - 1].heat_of_formation;
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Species({}, {:?})", self.name, self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn water_gas() -> Species {
        // representative NASA-9 interval for H2O(g), 200-1000 K band.
        Species {
            name: "H2O".into(),
            id: "g 8/89".into(),
            phase: Phase::Gas,
            elements: vec![("H".into(), 2.0), ("O".into(), 1.0)],
            molecular_weight: 18.01528,
            heat_of_formation: -241826.0,
            data: ThermoData::Polynomial(vec![TemperatureInterval {
                t_lo: 200.0,
                t_hi: 1000.0,
                a: [
                    -3.947960830e+04,
                    5.755731020e+02,
                    9.317826530e-01,
                    7.222712860e-03,
                    -7.342557370e-06,
                    4.955043490e-09,
                    -1.336933246e-12,
                ],
                b: [-3.303974310e+04, 1.724205775e+01],
            }]),
        }
    }

    #[test]
    fn clamps_below_range() {
        let sp = water_gas();
        // below t_lo should reuse the first interval's polynomial, not panic.
        let h_low = sp.enthalpy0(150.0);
        let h_edge = sp.enthalpy0(200.0);
        assert!(h_low.is_finite());
        assert!(h_edge.is_finite());
    }

    #[test]
    fn gibbs_is_enthalpy_minus_entropy() {
        let sp = water_gas();
        let t = 500.0;
        assert_relative_eq!(
            sp.gibbs0(t),
            sp.enthalpy0(t) - sp.entropy0(t),
            epsilon = 1e-12
        );
    }

    #[test]
    fn temperature_check_is_strict_membership() {
        let sp = water_gas();
        assert!(sp.temperature_check(500.0));
        assert!(sp.temperature_check(200.0));
        assert!(!sp.temperature_check(1000.0)); // upper bound excluded
        assert!(!sp.temperature_check(50.0));
    }

    #[test]
    fn transition_temperature_picks_nearest_end() {
        let sp = water_gas();
        assert_relative_eq!(sp.transition_temperature(210.0), 200.0);
        assert_relative_eq!(sp.transition_temperature(990.0), 1000.0);
    }

    fn sample_nasa9_text() -> String {
        // One gas species (2 intervals) + one single-temperature condensed
        // species, formatted exactly to the §6 column layout.
        let mut out = String::new();
        out.push_str("thermo\n");
        out.push_str("    200.000  1000.000  6000.000\n");
        let header = format!(
            "{:<18}{:<55}{:>2}{:<6}{}{:>13.6}{:>13.6}",
            "H2", "H2 ref-elements", 2, "tpis78", '0', 2.01588, 0.0
        );
        out.push_str(&header);
        out.push('\n');
        out.push_str("   200.000  1000.000 7 -1.0 -0.5  0.0  1.0  2.0  3.0  4.0            0.0\n");
        out.push_str(&format!(
            "{:>16.8}{:>16.8}{:>16.8}{:>16.8}{:>16.8}\n",
            0.0, 0.0, 3.5, 0.0, 0.0
        ));
        out.push_str(&format!(
            "{:>16.8}{:>16.8}{:>16}{:>16.8}{:>16.8}\n",
            0.0, 0.0, "", 0.0, -1.0
        ));
        out.push_str("  1000.000  6000.000 7 -1.0 -0.5  0.0  1.0  2.0  3.0  4.0            0.0\n");
        out.push_str(&format!(
            "{:>16.8}{:>16.8}{:>16.8}{:>16.8}{:>16.8}\n",
            0.0, 0.0, 3.5, 0.0, 0.0
        ));
        out.push_str(&format!(
            "{:>16.8}{:>16.8}{:>16}{:>16.8}{:>16.8}\n",
            0.0, 0.0, "", 0.0, -1.0
        ));
        let cond_header = format!(
            "{:<18}{:<55}{:>2}{:<6}{}{:>13.6}{:>13.6}",
            "AR(cr)", "argon solid ref", 0, "tde/89", '1', 39.948, 0.0
        );
        out.push_str(&cond_header);
        out.push('\n');
        out.push_str(&format!("{:>11.2}\n", 298.15));
        out.push_str("END\n");
        out
    }

    #[test]
    fn loads_fixed_column_records() {
        let text = sample_nasa9_text();
        let db = ThermoDB::load_nasa9(&text).expect("should parse");
        assert_eq!(db.len(), 2);
        let h2 = db.get(db.find("H2").expect("H2 present"));
        assert_eq!(h2.phase, Phase::Gas);
        match &h2.data {
            ThermoData::Polynomial(ivs) => assert_eq!(ivs.len(), 2),
            _ => panic!("expected polynomial data"),
        }
        let ar = db.get(db.find("AR(cr)").expect("AR(cr) present"));
        assert_eq!(ar.phase, Phase::Condensed);
        match &ar.data {
            ThermoData::SingleTemperature {
                reference_temperature,
                ..
            } => assert_relative_eq!(*reference_temperature, 298.15),
            _ => panic!("expected single-temperature data"),
        }
    }

    #[test]
    fn heat_of_formation_fallback_inherits_previous() {
        let mut a = water_gas();
        a.heat_of_formation = -100.0;
        let mut b = water_gas();
        b.heat_of_formation = 0.0;
        let mut species = vec![a, b];
        apply_heat_of_formation_fallback(&mut species);
        assert_relative_eq!(species[1].heat_of_formation, -100.0);
    }
}
