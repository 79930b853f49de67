//! Pretrained alignment model.
//!
//! The model is trained offline and shipped as a JSON artifact. Two shapes are
//! understood: a regression forest (mean of tree outputs) and a linear model.

use crate::models::{
    Metrics, CAFFEINE_CUPS, EXERCISE_MINUTES, SCREEN_HOURS, SLEEP_HOURS, WORK_HOURS,
};
use serde::Deserialize;
use serde_json::Value;
use std::{fs, path::Path, sync::Arc};
use thiserror::Error;
use tracing::{error, info};

pub const FEATURE_NAMES: [&str; 5] = ["sleep", "work", "exercise", "caffeine", "screen"];

pub trait Predictor: Send + Sync {
    /// Raw model output. Not clamped to [0, 100].
    fn predict(&self, metrics: &Metrics) -> f64;
}

#[derive(Debug, Clone, Error)]
#[error("model artifact {path} is unavailable: {reason}")]
pub struct ModelUnavailable {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelArtifact {
    Forest {
        #[serde(default)]
        features: Option<Vec<String>>,
        trees: Vec<RawTree>,
    },
    Linear {
        intercept: f64,
        coefficients: [f64; 5],
    },
}

/// Nodes stay untyped until each one can be reported by position.
#[derive(Debug, Clone, Deserialize)]
struct RawTree {
    nodes: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone)]
enum Model {
    Forest(Vec<Tree>),
    Linear {
        intercept: f64,
        coefficients: [f64; 5],
    },
}

impl RawTree {
    fn compile(self, tree_index: usize) -> Result<Tree, String> {
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                Node::deserialize(raw).map_err(|_| {
                    format!(
                        "tree {tree_index} node {index} is neither a split \
                         (feature, threshold, left, right) nor a leaf (value): {raw}"
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let tree = Tree { nodes };
        tree.check(tree_index)?;
        Ok(tree)
    }
}

impl Tree {
    fn evaluate(&self, features: &[f64; 5]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn largest_leaf(&self) -> f64 {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Leaf { value } => Some(value.abs()),
                Node::Split { .. } => None,
            })
            .fold(0.0, f64::max)
    }

    fn check(&self, tree_index: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err(format!("tree {tree_index} has no nodes"));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("tree {tree_index} node {index} has a non-finite leaf"));
                    }
                }
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= FEATURE_NAMES.len() {
                        return Err(format!(
                            "tree {tree_index} node {index} splits on unknown feature {feature}"
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!(
                            "tree {tree_index} node {index} has a non-finite threshold"
                        ));
                    }
                    // Children must come after their parent so evaluation terminates.
                    for child in [*left, *right] {
                        if child <= index || child >= self.nodes.len() {
                            return Err(format!(
                                "tree {tree_index} node {index} points at invalid child {child}"
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl ModelArtifact {
    fn compile(self) -> Result<Model, String> {
        match self {
            ModelArtifact::Forest { features, trees } => {
                if let Some(features) = features {
                    if features.iter().map(String::as_str).ne(FEATURE_NAMES) {
                        return Err(format!(
                            "feature order {features:?} does not match {FEATURE_NAMES:?}"
                        ));
                    }
                }
                if trees.is_empty() {
                    return Err("forest has no trees".to_string());
                }
                let trees = trees
                    .into_iter()
                    .enumerate()
                    .map(|(index, tree)| tree.compile(index))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Model::Forest(trees))
            }
            ModelArtifact::Linear {
                intercept,
                coefficients,
            } => {
                if intercept.is_finite() && coefficients.iter().all(|c| c.is_finite()) {
                    Ok(Model::Linear {
                        intercept,
                        coefficients,
                    })
                } else {
                    Err("linear model has non-finite parameters".to_string())
                }
            }
        }
    }
}

impl Model {
    /// Largest magnitude any intermediate sum can reach for in-range inputs.
    fn output_bound(&self) -> f64 {
        match self {
            Model::Forest(trees) => trees.iter().map(Tree::largest_leaf).sum(),
            Model::Linear {
                intercept,
                coefficients,
            } => {
                intercept.abs()
                    + coefficients
                        .iter()
                        .zip(feature_extents())
                        .map(|(c, extent)| c.abs() * extent)
                        .sum::<f64>()
            }
        }
    }
}

/// Largest absolute value each feature can take within the input bounds.
fn feature_extents() -> [f64; 5] {
    let low = Metrics {
        sleep: *SLEEP_HOURS.start(),
        work: *WORK_HOURS.start(),
        exercise: *EXERCISE_MINUTES.start(),
        caffeine: *CAFFEINE_CUPS.start(),
        screen: *SCREEN_HOURS.start(),
    }
    .features();
    let high = Metrics {
        sleep: *SLEEP_HOURS.end(),
        work: *WORK_HOURS.end(),
        exercise: *EXERCISE_MINUTES.end(),
        caffeine: *CAFFEINE_CUPS.end(),
        screen: *SCREEN_HOURS.end(),
    }
    .features();
    std::array::from_fn(|i| low[i].abs().max(high[i].abs()))
}

/// The loaded, validated model.
#[derive(Debug, Clone)]
pub struct AlignmentModel {
    model: Model,
}

impl AlignmentModel {
    pub fn load(path: &Path) -> Result<Self, ModelUnavailable> {
        let unavailable = |reason: String| ModelUnavailable {
            path: path.display().to_string(),
            reason,
        };
        let raw = fs::read_to_string(path).map_err(|err| unavailable(err.to_string()))?;
        Self::from_json(&raw).map_err(unavailable)
    }

    pub fn from_json(raw: &str) -> Result<Self, String> {
        let artifact: ModelArtifact = serde_json::from_str(raw).map_err(|err| err.to_string())?;
        let model = artifact.compile()?;
        if !model.output_bound().is_finite() {
            return Err("model parameters can overflow for in-range inputs".to_string());
        }
        Ok(Self { model })
    }

    pub fn kind(&self) -> &'static str {
        match self.model {
            Model::Forest(_) => "forest",
            Model::Linear { .. } => "linear",
        }
    }
}

impl Predictor for AlignmentModel {
    fn predict(&self, metrics: &Metrics) -> f64 {
        let features = metrics.features();
        match &self.model {
            Model::Forest(trees) => {
                let total: f64 = trees.iter().map(|tree| tree.evaluate(&features)).sum();
                total / trees.len() as f64
            }
            Model::Linear {
                intercept,
                coefficients,
            } => {
                intercept
                    + coefficients
                        .iter()
                        .zip(features.iter())
                        .map(|(c, x)| c * x)
                        .sum::<f64>()
            }
        }
    }
}

/// Outcome of loading the artifact at startup. There is no fallback model.
#[derive(Clone)]
pub enum ModelStatus {
    Ready(Arc<dyn Predictor>),
    Unavailable(ModelUnavailable),
}

impl ModelStatus {
    pub fn load(path: &Path) -> Self {
        match AlignmentModel::load(path) {
            Ok(model) => {
                info!(path = %path.display(), kind = model.kind(), "alignment model loaded");
                Self::Ready(Arc::new(model))
            }
            Err(err) => {
                error!("{err}");
                Self::Unavailable(err)
            }
        }
    }

    pub fn predictor(&self) -> Result<&dyn Predictor, ModelUnavailable> {
        match self {
            Self::Ready(model) => Ok(model.as_ref()),
            Self::Unavailable(err) => Err(err.clone()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOREST: &str = r#"{
        "kind": "forest",
        "features": ["sleep", "work", "exercise", "caffeine", "screen"],
        "trees": [
            { "nodes": [
                { "feature": 0, "threshold": 6.0, "left": 1, "right": 2 },
                { "value": 40.0 },
                { "value": 80.0 }
            ] },
            { "nodes": [
                { "feature": 2, "threshold": 20.0, "left": 1, "right": 2 },
                { "value": 50.0 },
                { "value": 90.0 }
            ] }
        ]
    }"#;

    fn corners() -> Vec<Metrics> {
        let mut out = Vec::new();
        for sleep in [4.0, 10.0] {
            for work in [2.0, 12.0] {
                for exercise in [0, 120] {
                    for caffeine in [0, 6] {
                        for screen in [1.0, 8.0] {
                            out.push(Metrics {
                                sleep,
                                work,
                                exercise,
                                caffeine,
                                screen,
                            });
                        }
                    }
                }
            }
        }
        out
    }

    #[test]
    fn forest_averages_tree_outputs() {
        let model = AlignmentModel::from_json(FOREST).unwrap();
        assert_eq!(model.kind(), "forest");
        // sleep 7.5 > 6.0 -> 80, exercise 30 > 20 -> 90
        assert_eq!(model.predict(&Metrics::default()), 85.0);

        let tired = Metrics {
            sleep: 5.0,
            exercise: 10,
            ..Metrics::default()
        };
        assert_eq!(model.predict(&tired), 45.0);
    }

    #[test]
    fn split_goes_left_on_equal_threshold() {
        let model = AlignmentModel::from_json(FOREST).unwrap();
        let edge = Metrics {
            sleep: 6.0,
            exercise: 20,
            ..Metrics::default()
        };
        assert_eq!(model.predict(&edge), 45.0);
    }

    #[test]
    fn linear_model_uses_feature_order() {
        let model = AlignmentModel::from_json(
            r#"{ "kind": "linear", "intercept": 10.0, "coefficients": [1.0, 2.0, 0.5, -3.0, -1.0] }"#,
        )
        .unwrap();
        // 10 + 7.5 + 16 + 15 - 6 - 3
        assert_eq!(model.predict(&Metrics::default()), 39.5);
    }

    #[test]
    fn predictions_are_finite_across_the_bounds() {
        let model = AlignmentModel::from_json(FOREST).unwrap();
        for metrics in corners() {
            assert!(model.predict(&metrics).is_finite(), "{metrics:?}");
        }
    }

    #[test]
    fn prediction_is_idempotent() {
        let model = AlignmentModel::from_json(FOREST).unwrap();
        let metrics = Metrics {
            sleep: 8.2,
            work: 9.4,
            exercise: 45,
            caffeine: 1,
            screen: 2.5,
        };
        assert_eq!(model.predict(&metrics), model.predict(&metrics));
    }

    #[test]
    fn rejects_child_pointing_backwards() {
        let err = AlignmentModel::from_json(
            r#"{ "kind": "forest", "trees": [ { "nodes": [
                { "feature": 0, "threshold": 6.0, "left": 0, "right": 1 },
                { "value": 1.0 }
            ] } ] }"#,
        )
        .expect_err("cycle");
        assert!(err.contains("invalid child"));
    }

    #[test]
    fn rejects_unknown_feature_and_empty_forest() {
        assert!(AlignmentModel::from_json(
            r#"{ "kind": "forest", "trees": [ { "nodes": [
                { "feature": 5, "threshold": 1.0, "left": 1, "right": 2 },
                { "value": 1.0 }, { "value": 2.0 }
            ] } ] }"#,
        )
        .is_err());
        assert!(AlignmentModel::from_json(r#"{ "kind": "forest", "trees": [] }"#).is_err());
    }

    #[test]
    fn rejects_coefficients_that_overflow_in_range() {
        let err = AlignmentModel::from_json(
            r#"{ "kind": "linear", "intercept": 0.0, "coefficients": [0.0, 0.0, 1e308, 0.0, 0.0] }"#,
        )
        .expect_err("overflow at exercise=120");
        assert!(err.contains("overflow"));

        let err = AlignmentModel::from_json(
            r#"{ "kind": "forest", "trees": [
                { "nodes": [ { "value": 1.5e308 } ] },
                { "nodes": [ { "value": 1.5e308 } ] }
            ] }"#,
        )
        .expect_err("forest sum overflows");
        assert!(err.contains("overflow"));
    }

    #[test]
    fn malformed_node_is_reported_by_position() {
        let err = AlignmentModel::from_json(
            r#"{ "kind": "forest", "trees": [
                { "nodes": [ { "value": 1.0 } ] },
                { "nodes": [
                    { "feature": 0, "threshold": 6.0, "left": 1, "right": 2 },
                    { "value": 1.0 },
                    { "feature": 1, "left": 3 }
                ] }
            ] }"#,
        )
        .expect_err("malformed node");
        assert!(err.starts_with("tree 1 node 2 is neither a split"), "{err}");
    }

    #[test]
    fn rejects_wrong_feature_order() {
        let err = AlignmentModel::from_json(
            r#"{ "kind": "forest", "features": ["work", "sleep", "exercise", "caffeine", "screen"],
                 "trees": [ { "nodes": [ { "value": 1.0 } ] } ] }"#,
        )
        .expect_err("order");
        assert!(err.contains("feature order"));
    }

    #[test]
    fn missing_artifact_is_unavailable() {
        let err = AlignmentModel::load(Path::new("/nonexistent/alignment_model.json"))
            .expect_err("missing file");
        assert_eq!(err.path, "/nonexistent/alignment_model.json");
        assert!(!err.reason.is_empty());
    }

    #[test]
    fn bundled_artifact_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/alignment_model.json");
        let model = AlignmentModel::load(&path).expect("bundled model");
        for metrics in corners() {
            assert!(model.predict(&metrics).is_finite());
        }
    }
}
