//! Confusion matrix and per-class precision / recall / F1.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    labels: Vec<usize>,
    names: Vec<String>,
    /// `counts[true][predicted]`, indexed by position in `labels`.
    counts: Vec<Vec<usize>>,
    correct: usize,
    total: usize,
}

impl ConfusionMatrix {
    /// Pairs whose labels are not listed are counted towards accuracy only.
    pub fn new(
        labels: &[usize],
        names: &[String],
        y_true: &[usize],
        y_pred: &[usize],
    ) -> Result<Self> {
        if labels.len() != names.len() {
            return Err(Error::NameCount {
                names: names.len(),
                labels: labels.len(),
            });
        }
        if y_true.len() != y_pred.len() {
            return Err(Error::PredictionCount {
                truth: y_true.len(),
                predicted: y_pred.len(),
            });
        }

        let position = |label: usize| labels.iter().position(|&l| l == label);
        let mut counts = vec![vec![0; labels.len()]; labels.len()];
        let mut skipped = 0;
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (position(t), position(p)) {
                (Some(t), Some(p)) => counts[t][p] += 1,
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(skipped, "pairs with labels outside the matrix");
        }

        Ok(Self {
            labels: labels.to_vec(),
            names: names.to_vec(),
            counts,
            correct: y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count(),
            total: y_true.len(),
        })
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn counts(&self) -> &[Vec<usize>] {
        &self.counts
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct, self.total)
    }

    fn true_positives(&self, i: usize) -> usize {
        self.counts[i][i]
    }

    fn support(&self, i: usize) -> usize {
        self.counts[i].iter().sum()
    }

    fn predicted(&self, i: usize) -> usize {
        self.counts.iter().map(|row| row[i]).sum()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const HEADER_CHARS: usize = 6;

        let name_width = self.names.iter().map(String::len).max().unwrap_or(0).max(4);
        let headers: Vec<String> = self
            .names
            .iter()
            .map(|name| name.chars().take(HEADER_CHARS).collect())
            .collect();
        let cell_width = self
            .counts
            .iter()
            .flatten()
            .map(|c| c.to_string().len())
            .chain(headers.iter().map(|h| h.chars().count()))
            .max()
            .unwrap_or(1)
            .max(3);

        write!(f, "{:>name_width$}", "")?;
        for header in &headers {
            write!(f, " {header:>cell_width$}")?;
        }
        writeln!(f)?;
        for (name, row) in self.names.iter().zip(&self.counts) {
            write!(f, "{name:>name_width$}")?;
            for count in row {
                write!(f, " {count:>cell_width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: usize,
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Averages {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: Averages,
    pub weighted_avg: Averages,
    pub confusion: ConfusionMatrix,
}

impl ClassificationReport {
    pub fn new(
        labels: &[usize],
        names: &[String],
        y_true: &[usize],
        y_pred: &[usize],
    ) -> Result<Self> {
        let confusion = ConfusionMatrix::new(labels, names, y_true, y_pred)?;

        let classes: Vec<ClassMetrics> = labels
            .iter()
            .zip(names)
            .enumerate()
            .map(|(i, (&label, name))| {
                let tp = confusion.true_positives(i);
                let support = confusion.support(i);
                let precision = ratio(tp, confusion.predicted(i));
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label,
                    name: name.clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let support: usize = classes.iter().map(|c| c.support).sum();
        let n = classes.len().max(1) as f64;
        let macro_avg = Averages {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / n,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / n,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / n,
            support,
        };
        let weighted = |metric: fn(&ClassMetrics) -> f64| {
            if support == 0 {
                return 0.0;
            }
            classes
                .iter()
                .map(|c| metric(c) * c.support as f64)
                .sum::<f64>()
                / support as f64
        };
        let weighted_avg = Averages {
            precision: weighted(|c: &ClassMetrics| c.precision),
            recall: weighted(|c: &ClassMetrics| c.recall),
            f1: weighted(|c: &ClassMetrics| c.f1),
            support,
        };

        Ok(Self {
            accuracy: confusion.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
            confusion,
        })
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.name, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.confusion.total
        )?;
        for (name, avg) in [
            ("macro avg", &self.macro_avg),
            ("weighted avg", &self.weighted_avg),
        ] {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1, avg.support
            )?;
        }
        Ok(())
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn hand_computed_metrics() {
        let y_true = [0, 0, 0, 1, 1, 2];
        let y_pred = [0, 0, 1, 1, 2, 2];
        let report = ClassificationReport::new(
            &[0, 1, 2],
            &names(&["bass", "brass", "flute"]),
            &y_true,
            &y_pred,
        )
        .unwrap();

        assert_eq!(report.confusion.counts(), &[vec![2, 1, 0], vec![0, 1, 1], vec![0, 0, 1]]);
        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);

        let bass = &report.classes[0];
        assert!((bass.precision - 1.0).abs() < 1e-12);
        assert!((bass.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((bass.f1 - 0.8).abs() < 1e-12);
        assert_eq!(bass.support, 3);

        let brass = &report.classes[1];
        assert!((brass.precision - 0.5).abs() < 1e-12);
        assert!((brass.recall - 0.5).abs() < 1e-12);

        let macro_p = (1.0 + 0.5 + 0.5) / 3.0;
        assert!((report.macro_avg.precision - macro_p).abs() < 1e-12);
        let weighted_r = (3.0 * (2.0 / 3.0) + 2.0 * 0.5 + 1.0 * 1.0) / 6.0;
        assert!((report.weighted_avg.recall - weighted_r).abs() < 1e-12);
    }

    #[test]
    fn unpredicted_class_scores_zero() {
        let report =
            ClassificationReport::new(&[0, 1], &names(&["a", "b"]), &[0, 1], &[0, 0]).unwrap();
        assert_eq!(report.classes[1].precision, 0.0);
        assert_eq!(report.classes[1].f1, 0.0);
    }

    #[test]
    fn rendering_has_every_class() {
        let report = ClassificationReport::new(
            &[0, 9],
            &names(&["bass", "synth_lead"]),
            &[0, 9, 9],
            &[0, 9, 0],
        )
        .unwrap();
        let text = report.to_string();
        assert!(text.contains("precision"));
        assert!(text.contains("synth_lead"));
        assert!(text.contains("weighted avg"));
        assert!(text.contains("accuracy"));

        let matrix = report.confusion.to_string();
        assert_eq!(matrix.lines().count(), 3);
        let header = matrix.lines().next().unwrap();
        assert!(header.contains("bass"), "{matrix}");
        assert!(header.contains("synth_"), "{matrix}");
        assert!(!header.contains("synth_lead"), "{matrix}");
        let synth_row: Vec<_> = matrix.lines().nth(2).unwrap().split_whitespace().collect();
        assert_eq!(synth_row, ["synth_lead", "1", "1"]);
    }

    #[test]
    fn serializes_to_json() {
        let report =
            ClassificationReport::new(&[0], &names(&["bass"]), &[0, 0], &[0, 0]).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["accuracy"], 1.0);
        assert_eq!(json["classes"][0]["name"], "bass");
    }

    #[test]
    fn mismatched_lengths() {
        assert!(matches!(
            ConfusionMatrix::new(&[0], &names(&["a"]), &[0, 0], &[0]),
            Err(Error::PredictionCount { .. })
        ));
        assert!(matches!(
            ConfusionMatrix::new(&[0, 1], &names(&["a"]), &[0], &[0]),
            Err(Error::NameCount { .. })
        ));
    }
}
