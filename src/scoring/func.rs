//! Suspiciousness functions of four probabilities

use crate::error::{MineError, MineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// `Pr[fail]`, `Pr[fail ∧ pattern]`, `Pr[ok]`, `Pr[ok ∧ pattern]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Probabilities {
    pub pr_f: f64,
    pub pr_f_node: f64,
    pub pr_o: f64,
    pub pr_o_node: f64,
}

impl Probabilities {
    pub fn new(pr_f: f64, pr_f_node: f64, pr_o: f64, pr_o_node: f64) -> Self {
        Self {
            pr_f,
            pr_f_node,
            pr_o,
            pr_o_node,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScoreFunc {
    RelativePrecision,
    #[default]
    RelativeF1,
    RelativeJaccard,
    RelativeOchiai,
    Precision,
    F1,
    Jaccard,
    OchiaiSquared,
    Ochiai,
    Contrast,
    AssociationalRisk,
    InformationGain,
}

const ABBREVIATIONS: &[(&str, ScoreFunc)] = &[
    ("rp", ScoreFunc::RelativePrecision),
    ("rf1", ScoreFunc::RelativeF1),
    ("rj", ScoreFunc::RelativeJaccard),
    ("ro", ScoreFunc::RelativeOchiai),
    ("precision", ScoreFunc::Precision),
    ("p", ScoreFunc::Precision),
    ("f1", ScoreFunc::F1),
    ("jaccard", ScoreFunc::Jaccard),
    ("j", ScoreFunc::Jaccard),
    ("o", ScoreFunc::Ochiai),
    ("och", ScoreFunc::Ochiai),
    ("ochiai", ScoreFunc::Ochiai),
    ("o2", ScoreFunc::OchiaiSquared),
    ("c", ScoreFunc::Contrast),
    ("ar", ScoreFunc::AssociationalRisk),
    ("ig", ScoreFunc::InformationGain),
];

impl ScoreFunc {
    pub const ALL: [ScoreFunc; 12] = [
        ScoreFunc::RelativePrecision,
        ScoreFunc::RelativeF1,
        ScoreFunc::RelativeJaccard,
        ScoreFunc::RelativeOchiai,
        ScoreFunc::Precision,
        ScoreFunc::F1,
        ScoreFunc::Jaccard,
        ScoreFunc::OchiaiSquared,
        ScoreFunc::Ochiai,
        ScoreFunc::Contrast,
        ScoreFunc::AssociationalRisk,
        ScoreFunc::InformationGain,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScoreFunc::RelativePrecision => "RelativePrecision",
            ScoreFunc::RelativeF1 => "RelativeF1",
            ScoreFunc::RelativeJaccard => "RelativeJaccard",
            ScoreFunc::RelativeOchiai => "RelativeOchiai",
            ScoreFunc::Precision => "Precision",
            ScoreFunc::F1 => "F1",
            ScoreFunc::Jaccard => "Jaccard",
            ScoreFunc::OchiaiSquared => "OchiaiSquared",
            ScoreFunc::Ochiai => "Ochiai",
            ScoreFunc::Contrast => "Contrast",
            ScoreFunc::AssociationalRisk => "AssociationalRisk",
            ScoreFunc::InformationGain => "InformationGain",
        }
    }

    /// Short names accepted by `from_str`
    pub fn abbreviations(&self) -> Vec<&'static str> {
        ABBREVIATIONS
            .iter()
            .filter(|(_, f)| f == self)
            .map(|(a, _)| *a)
            .collect()
    }

    /// The formula, unchecked. May be NaN or infinite.
    pub fn raw(&self, p: Probabilities) -> f64 {
        let Probabilities {
            pr_f,
            pr_f_node: prf,
            pr_o,
            pr_o_node: pro,
        } = p;
        let prt = prf + pro;
        let a = prf / prt;
        let b = pr_f / (pr_f + pr_o);
        match self {
            ScoreFunc::RelativePrecision => a - b,
            ScoreFunc::RelativeF1 => 2.0 * (prt / (pr_f + prt)) * (a - b),
            ScoreFunc::RelativeJaccard => prf / (pr_f + pro) - b,
            ScoreFunc::RelativeOchiai => (prt / pr_f).sqrt() * (a - b),
            ScoreFunc::Precision => a,
            ScoreFunc::F1 => 2.0 * (prt / (pr_f + prt)) * a,
            ScoreFunc::Jaccard => prf / (pr_f + pro),
            ScoreFunc::OchiaiSquared => (prf / pr_f) * (prf / prt),
            ScoreFunc::Ochiai => ((prf / pr_f) * (prf / prt)).sqrt(),
            ScoreFunc::Contrast => prf - pro,
            ScoreFunc::AssociationalRisk => {
                let (c, x, y) = (pr_f, prf, pro);
                (x - c * x - c * y) / ((x + y + 1e-5) - (x + y) * (x + y))
            }
            ScoreFunc::InformationGain => {
                let lg = |x: f64| if x == 0.0 { 0.0 } else { x.log2() };
                let hf = pr_f * lg(pr_f) + pr_o * lg(pr_o);
                let hfn = a * lg(a) + (pro / prt) * lg(pro / prt);
                hfn - hf
            }
        }
    }

    /// The formula, rejecting results outside its domain.
    ///
    /// Both Ochiai forms are only defined while `Pr[fail]` stays below the
    /// pattern's precision.
    pub fn apply(&self, p: Probabilities) -> MineResult<f64> {
        let s = self.raw(p);
        let ochiai = matches!(self, ScoreFunc::Ochiai | ScoreFunc::RelativeOchiai);
        let precision = p.pr_f_node / (p.pr_f_node + p.pr_o_node);
        if !s.is_finite() || (ochiai && p.pr_f >= precision) {
            return Err(MineError::InvalidScoreDomain {
                score: self.name(),
                pr_f: p.pr_f,
                pr_f_node: p.pr_f_node,
                pr_o: p.pr_o,
                pr_o_node: p.pr_o_node,
            });
        }
        Ok(s)
    }
}

impl FromStr for ScoreFunc {
    type Err = MineError;

    /// Accepts full names (case-insensitive) and abbreviations
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        if let Some((_, f)) = ABBREVIATIONS.iter().find(|(a, _)| a.eq_ignore_ascii_case(key)) {
            return Ok(*f);
        }
        ScoreFunc::ALL
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(key))
            .copied()
            .ok_or_else(|| MineError::UnknownScore(s.to_string()))
    }
}

impl fmt::Display for ScoreFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_parse_names_and_abbreviations() {
        assert_eq!("rf1".parse::<ScoreFunc>().unwrap(), ScoreFunc::RelativeF1);
        assert_eq!("o2".parse::<ScoreFunc>().unwrap(), ScoreFunc::OchiaiSquared);
        assert_eq!("och".parse::<ScoreFunc>().unwrap(), ScoreFunc::Ochiai);
        assert_eq!("precision".parse::<ScoreFunc>().unwrap(), ScoreFunc::Precision);
        assert_eq!("InformationGain".parse::<ScoreFunc>().unwrap(), ScoreFunc::InformationGain);
        assert!(matches!("bogus".parse::<ScoreFunc>(), Err(MineError::UnknownScore(_))));
        for f in ScoreFunc::ALL {
            assert!(!f.abbreviations().is_empty(), "{} has no abbreviation", f);
        }
    }

    #[test]
    fn test_formulas() {
        // prF = 0.5, prf = 0.4, prO = 0.5, pro = 0.1
        let p = Probabilities::new(0.5, 0.4, 0.5, 0.1);
        assert!(close(ScoreFunc::Precision.apply(p).unwrap(), 0.8));
        assert!(close(ScoreFunc::RelativePrecision.apply(p).unwrap(), 0.3));
        assert!(close(ScoreFunc::F1.apply(p).unwrap(), 2.0 * 0.5 * 0.8));
        assert!(close(ScoreFunc::RelativeF1.apply(p).unwrap(), 2.0 * 0.5 * 0.3));
        assert!(close(ScoreFunc::Jaccard.apply(p).unwrap(), 0.4 / 0.6));
        assert!(close(ScoreFunc::Contrast.apply(p).unwrap(), 0.3));
        assert!(close(ScoreFunc::OchiaiSquared.apply(p).unwrap(), 0.8 * 0.8));
        assert!(close(ScoreFunc::Ochiai.apply(p).unwrap(), 0.8));
        assert!(close(ScoreFunc::RelativeOchiai.apply(p).unwrap(), 1.0 * 0.3));
    }

    #[test]
    fn test_information_gain_handles_zero() {
        let p = Probabilities::new(0.5, 0.5, 0.5, 0.0);
        // a pure split gains the full bit
        assert!(close(ScoreFunc::InformationGain.apply(p).unwrap(), 1.0));
    }

    #[test]
    fn test_out_of_domain_is_an_error() {
        let empty = Probabilities::new(0.5, 0.0, 0.5, 0.0);
        assert!(matches!(
            ScoreFunc::Precision.apply(empty),
            Err(MineError::InvalidScoreDomain { .. })
        ));
        // precision 0.25 is below Pr[fail]
        let weak = Probabilities::new(0.5, 0.1, 0.5, 0.3);
        assert!(ScoreFunc::Ochiai.apply(weak).is_err());
        assert!(ScoreFunc::RelativeOchiai.apply(weak).is_err());
        assert!(ScoreFunc::RelativePrecision.apply(weak).is_ok());
    }
}
