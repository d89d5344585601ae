//! Boosted Haar cascade object detector (Viola-Jones).
//!
//! Reads OpenCV's `opencv-cascade-classifier` XML format (e.g.
//! `haarcascade_frontalface_default.xml`) and runs multi-scale sliding-window
//! detection over an image pyramid, followed by neighbor grouping.

use crate::frame::resize_bilinear;
use crate::localizer::{DetectionParams, ObjectDetector};
use crate::types::Rect;
use ndarray::{Array2, ArrayView2};
use roxmltree::Node;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

// --- Named constants ---
/// Relative tolerance for treating two raw hits as the same object.
const GROUP_EPS: f64 = 0.2;
/// Windows flatter than this (intensity std dev) are skipped outright.
const MIN_WINDOW_STDDEV: f64 = 10.0;
/// Above this pyramid scale the window advances one pixel at a time instead of two.
const FINE_STEP_SCALE: f64 = 2.0;
const MAX_FEATURE_RECTS: usize = 3;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("cascade file not found: {0} — point FACEGATE_CASCADE_PATH at an OpenCV haarcascade XML")]
    ModelNotFound(String),
    #[error("failed to read cascade: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid cascade XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("malformed cascade: {0}")]
    Malformed(String),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone)]
struct WeightedRect {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    weight: f64,
}

/// Haar-like feature: weighted sum of up to three rectangles.
#[derive(Debug, Clone)]
struct Feature {
    rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone)]
struct TreeNode {
    /// Next node index when positive, otherwise the negated leaf index.
    left: i32,
    right: i32,
    feature: usize,
    threshold: f64,
}

#[derive(Debug, Clone)]
struct WeakClassifier {
    nodes: Vec<TreeNode>,
    leaves: Vec<f64>,
}

impl WeakClassifier {
    /// Walk the tree from the root, returning the reached leaf value.
    fn predict<F: Fn(usize) -> f64>(&self, feature_value: &F) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            let next = if feature_value(node.feature) < node.threshold {
                node.left
            } else {
                node.right
            };
            if next <= 0 {
                return self.leaves[next.unsigned_abs() as usize];
            }
            idx = next as usize;
        }
    }
}

#[derive(Debug, Clone)]
struct Stage {
    threshold: f64,
    classifiers: Vec<WeakClassifier>,
}

/// Summed-area tables for O(1) rectangle sums and squared sums.
struct Integral {
    sum: Array2<i64>,
    sqsum: Array2<i64>,
}

impl Integral {
    fn new(gray: ArrayView2<u8>) -> Self {
        let (h, w) = gray.dim();
        let mut sum = Array2::<i64>::zeros((h + 1, w + 1));
        let mut sqsum = Array2::<i64>::zeros((h + 1, w + 1));
        for y in 0..h {
            let mut row = 0i64;
            let mut row_sq = 0i64;
            for x in 0..w {
                let p = gray[[y, x]] as i64;
                row += p;
                row_sq += p * p;
                sum[[y + 1, x + 1]] = sum[[y, x + 1]] + row;
                sqsum[[y + 1, x + 1]] = sqsum[[y, x + 1]] + row_sq;
            }
        }
        Self { sum, sqsum }
    }

    fn rect(table: &Array2<i64>, x: usize, y: usize, w: usize, h: usize) -> i64 {
        table[[y + h, x + w]] - table[[y, x + w]] - table[[y + h, x]] + table[[y, x]]
    }

    fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        Self::rect(&self.sum, x, y, w, h)
    }

    fn rect_sqsum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        Self::rect(&self.sqsum, x, y, w, h)
    }
}

/// A loaded Haar cascade. Immutable after loading; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct HaarCascade {
    window_width: usize,
    window_height: usize,
    stages: Vec<Stage>,
    features: Vec<Feature>,
}

impl HaarCascade {
    /// Load a cascade from an OpenCV XML file.
    pub fn load(path: &str) -> Result<Self, CascadeError> {
        if !Path::new(path).exists() {
            return Err(CascadeError::ModelNotFound(path.to_string()));
        }
        let xml = std::fs::read_to_string(path)?;
        let cascade = Self::from_xml(&xml)?;

        tracing::info!(
            path,
            window = ?cascade.window_size(),
            stages = cascade.stages.len(),
            features = cascade.features.len(),
            "loaded Haar cascade"
        );

        Ok(cascade)
    }

    /// Parse a cascade from the text of an OpenCV XML file.
    pub fn from_xml(xml: &str) -> Result<Self, CascadeError> {
        let doc = roxmltree::Document::parse(xml)?;
        let root = doc
            .descendants()
            .find(|n| n.has_tag_name("cascade"))
            .ok_or_else(|| CascadeError::Malformed("no <cascade> element".into()))?;

        let stage_type = text(root, "stageType")?;
        if stage_type != "BOOST" {
            return Err(CascadeError::Unsupported(format!("stageType {stage_type}")));
        }
        let feature_type = text(root, "featureType")?;
        if feature_type != "HAAR" {
            return Err(CascadeError::Unsupported(format!("featureType {feature_type}")));
        }
        if let Ok(params) = child(root, "featureParams") {
            let max_cat: usize = number(params, "maxCatCount")?;
            if max_cat > 0 {
                return Err(CascadeError::Unsupported("categorical splits".into()));
            }
        }

        let window_width: usize = number(root, "width")?;
        let window_height: usize = number(root, "height")?;
        if window_width < 3 || window_height < 3 {
            return Err(CascadeError::Malformed(format!(
                "window {window_width}x{window_height} is too small"
            )));
        }

        let features = elements(child(root, "features")?)
            .map(|n| parse_feature(n, window_width, window_height))
            .collect::<Result<Vec<_>, _>>()?;

        let stages = elements(child(root, "stages")?)
            .map(|n| parse_stage(n, features.len()))
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(CascadeError::Malformed("cascade has no stages".into()));
        }

        Ok(Self {
            window_width,
            window_height,
            stages,
            features,
        })
    }

    /// Base detection window `(width, height)`.
    pub fn window_size(&self) -> (usize, usize) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Multi-scale detection followed by neighbor grouping.
    pub fn detect_multi_scale(&self, gray: ArrayView2<u8>, params: &DetectionParams) -> Vec<Rect> {
        let raw = self.detect_raw(gray, params.scale_factor());
        let grouped = group_rectangles(&raw, params.min_neighbors(), GROUP_EPS);
        tracing::debug!(raw = raw.len(), grouped = grouped.len(), "cascade detection");
        grouped
    }

    /// Every window accepted by all stages, across the image pyramid.
    fn detect_raw(&self, gray: ArrayView2<u8>, scale_factor: f64) -> Vec<Rect> {
        let (height, width) = gray.dim();
        let mut hits = Vec::new();
        let mut factor = 1.0f64;

        loop {
            let win_w = (self.window_width as f64 * factor).round() as usize;
            let win_h = (self.window_height as f64 * factor).round() as usize;
            if win_w > width || win_h > height {
                break;
            }

            let scaled_w = (width as f64 / factor).round() as usize;
            let scaled_h = (height as f64 / factor).round() as usize;
            if scaled_w < self.window_width || scaled_h < self.window_height {
                break;
            }

            let scaled = if factor == 1.0 {
                gray.to_owned()
            } else {
                resize_bilinear(gray, scaled_w, scaled_h)
            };
            let integral = Integral::new(scaled.view());
            let step = if factor > FINE_STEP_SCALE { 1 } else { 2 };

            for y in (0..=scaled_h - self.window_height).step_by(step) {
                for x in (0..=scaled_w - self.window_width).step_by(step) {
                    if self.accepts(&integral, x, y) {
                        hits.push(Rect::new(
                            (x as f64 * factor).round() as i32,
                            (y as f64 * factor).round() as i32,
                            win_w as i32,
                            win_h as i32,
                        ));
                    }
                }
            }

            factor *= scale_factor;
        }

        hits
    }

    /// Run every stage on the window at `(x, y)`; reject on the first failing stage.
    fn accepts(&self, integral: &Integral, x: usize, y: usize) -> bool {
        // Variance normalization over the window minus a one-pixel border.
        let (nx, ny) = (x + 1, y + 1);
        let (nw, nh) = (self.window_width - 2, self.window_height - 2);
        let area = (nw * nh) as f64;
        let sum = integral.rect_sum(nx, ny, nw, nh) as f64;
        let sqsum = integral.rect_sqsum(nx, ny, nw, nh) as f64;

        let nf = area * sqsum - sum * sum;
        if nf <= 0.0 {
            return false;
        }
        let norm = nf.sqrt();
        if norm / area <= MIN_WINDOW_STDDEV {
            return false;
        }
        let inv_norm = 1.0 / norm;

        let feature_value = |idx: usize| -> f64 {
            let raw: f64 = self.features[idx]
                .rects
                .iter()
                .map(|r| r.weight * integral.rect_sum(x + r.x, y + r.y, r.width, r.height) as f64)
                .sum();
            raw * inv_norm
        };

        self.stages.iter().all(|stage| {
            let score: f64 = stage
                .classifiers
                .iter()
                .map(|weak| weak.predict(&feature_value))
                .sum();
            score >= stage.threshold
        })
    }
}

impl ObjectDetector for HaarCascade {
    fn detect(&self, gray: ArrayView2<u8>, params: &DetectionParams) -> Vec<Rect> {
        self.detect_multi_scale(gray, params)
    }
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Result<Node<'a, 'input>, CascadeError> {
    elements(node)
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| CascadeError::Malformed(format!("missing <{name}>")))
}

fn text<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str, CascadeError> {
    Ok(child(node, name)?.text().unwrap_or("").trim())
}

fn number<T: FromStr>(node: Node<'_, '_>, name: &str) -> Result<T, CascadeError> {
    let raw = text(node, name)?;
    raw.parse()
        .map_err(|_| CascadeError::Malformed(format!("<{name}> is not a number: {raw:?}")))
}

fn numbers(raw: &str, what: &str) -> Result<Vec<f64>, CascadeError> {
    raw.split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| CascadeError::Malformed(format!("bad number {tok:?} in {what}")))
        })
        .collect()
}

fn parse_feature(node: Node<'_, '_>, win_w: usize, win_h: usize) -> Result<Feature, CascadeError> {
    if let Ok(tilted) = text(node, "tilted") {
        if tilted != "0" {
            return Err(CascadeError::Unsupported("tilted Haar features".into()));
        }
    }

    let mut rects = Vec::with_capacity(MAX_FEATURE_RECTS);
    for rect_node in elements(child(node, "rects")?) {
        let vals = numbers(rect_node.text().unwrap_or(""), "feature rect")?;
        let [x, y, w, h, weight] = vals[..] else {
            return Err(CascadeError::Malformed(format!(
                "feature rect needs 5 values, got {}",
                vals.len()
            )));
        };
        if !vals.iter().all(|v| v.is_finite()) {
            return Err(CascadeError::Malformed("non-finite feature rect".into()));
        }
        if x < 0.0 || y < 0.0 || w < 0.0 || h < 0.0 {
            return Err(CascadeError::Malformed("negative feature rect".into()));
        }
        // Bound in f64 before casting to usize.
        if x + w > win_w as f64 || y + h > win_h as f64 {
            return Err(CascadeError::Malformed(format!(
                "feature rect {x} {y} {w} {h} exceeds the {win_w}x{win_h} window"
            )));
        }
        rects.push(WeightedRect {
            x: x as usize,
            y: y as usize,
            width: w as usize,
            height: h as usize,
            weight,
        });
    }

    if rects.is_empty() || rects.len() > MAX_FEATURE_RECTS {
        return Err(CascadeError::Malformed(format!(
            "feature has {} rects (expected 1..={MAX_FEATURE_RECTS})",
            rects.len()
        )));
    }
    Ok(Feature { rects })
}

fn parse_stage(node: Node<'_, '_>, feature_count: usize) -> Result<Stage, CascadeError> {
    let threshold: f64 = number(node, "stageThreshold")?;
    let classifiers = elements(child(node, "weakClassifiers")?)
        .map(|n| parse_weak(n, feature_count))
        .collect::<Result<Vec<_>, _>>()?;
    if classifiers.is_empty() {
        return Err(CascadeError::Malformed("stage has no weak classifiers".into()));
    }
    Ok(Stage { threshold, classifiers })
}

fn parse_weak(node: Node<'_, '_>, feature_count: usize) -> Result<WeakClassifier, CascadeError> {
    let raw_nodes = numbers(text(node, "internalNodes")?, "internalNodes")?;
    let leaves = numbers(text(node, "leafValues")?, "leafValues")?;

    if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
        return Err(CascadeError::Malformed(format!(
            "internalNodes length {} is not a multiple of 4",
            raw_nodes.len()
        )));
    }

    let nodes: Vec<TreeNode> = raw_nodes
        .chunks_exact(4)
        .map(|c| TreeNode {
            left: c[0] as i32,
            right: c[1] as i32,
            feature: c[2] as usize,
            threshold: c[3],
        })
        .collect();

    // Every branch must land on a leaf that exists or on a later node.
    let target_ok = |from: usize, t: i32| {
        if t > 0 {
            (t as usize) > from && (t as usize) < nodes.len()
        } else {
            (t.unsigned_abs() as usize) < leaves.len()
        }
    };
    for (i, n) in nodes.iter().enumerate() {
        if n.feature >= feature_count {
            return Err(CascadeError::Malformed(format!(
                "feature index {} out of range ({feature_count} features)",
                n.feature
            )));
        }
        if !target_ok(i, n.left) || !target_ok(i, n.right) {
            return Err(CascadeError::Malformed("tree branch points backward or past its nodes or leaves".into()));
        }
    }

    Ok(WeakClassifier { nodes, leaves })
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra] = rb;
    }
}

fn similar(a: &Rect, b: &Rect, eps: f64) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) as f64 * 0.5;
    (a.x - b.x).abs() as f64 <= delta
        && (a.y - b.y).abs() as f64 <= delta
        && (a.right() - b.right()).abs() as f64 <= delta
        && (a.bottom() - b.bottom()).abs() as f64 <= delta
}

/// Cluster similar hits and keep clusters with more than `min_neighbors` members.
///
/// Each surviving cluster is replaced by its average rectangle. A cluster that
/// sits inside a stronger one is dropped. Output order follows the first hit
/// of each cluster. `min_neighbors == 0` returns the hits unchanged.
pub(crate) fn group_rectangles(rects: &[Rect], min_neighbors: usize, eps: f64) -> Vec<Rect> {
    if min_neighbors == 0 || rects.is_empty() {
        return rects.to_vec();
    }

    let n = rects.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&rects[i], &rects[j], eps) {
                union(&mut parent, i, j);
            }
        }
    }

    // Label clusters in order of first appearance.
    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut sums: Vec<[i64; 4]> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    for (i, r) in rects.iter().enumerate() {
        let root = find(&mut parent, i);
        let label = match labels[root] {
            Some(l) => l,
            None => {
                labels[root] = Some(sums.len());
                sums.push([0; 4]);
                counts.push(0);
                sums.len() - 1
            }
        };
        let s = &mut sums[label];
        s[0] += r.x as i64;
        s[1] += r.y as i64;
        s[2] += r.width as i64;
        s[3] += r.height as i64;
        counts[label] += 1;
    }

    let averaged: Vec<Rect> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| {
            let avg = |v: i64| (v as f64 / c as f64).round() as i32;
            Rect::new(avg(s[0]), avg(s[1]), avg(s[2]), avg(s[3]))
        })
        .collect();

    let mut kept = Vec::new();
    for (i, r1) in averaged.iter().enumerate() {
        let n1 = counts[i];
        if n1 <= min_neighbors {
            continue;
        }
        let swallowed = averaged.iter().enumerate().any(|(j, r2)| {
            let n2 = counts[j];
            if j == i || n2 <= min_neighbors {
                return false;
            }
            let dx = (r2.width as f64 * eps).round() as i32;
            let dy = (r2.height as f64 * eps).round() as i32;
            r1.x >= r2.x - dx
                && r1.y >= r2.y - dy
                && r1.right() <= r2.right() + dx
                && r1.bottom() <= r2.bottom() + dy
                && (n2 > n1.max(3) || n1 < 3)
        });
        if !swallowed {
            kept.push(*r1);
        }
    }

    kept
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::Array2;

    /// One-stage cascade on a 24x24 window firing when the top half is
    /// brighter than the bottom half by `threshold` (normalized units).
    pub(crate) fn bright_over_dark_xml(threshold: f64) -> String {
        format!(
            r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>24</height>
  <width>24</width>
  <stageParams><maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams><maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <!-- stage 0 -->
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 {threshold:e}</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 24 24 -1.</_>
        <_>
          0 0 24 12 2.</_></rects></_></features></cascade>
</opencv_storage>
"#
        )
    }

    /// 160x160 mid-gray canvas with a 64x64 bright-over-dark patch at (40, 40).
    pub(crate) fn patch_image() -> Array2<u8> {
        Array2::from_shape_fn((160, 160), |(y, x)| {
            if (40..104).contains(&x) && (40..104).contains(&y) {
                if y < 72 { 230 } else { 30 }
            } else {
                128
            }
        })
    }

    pub(crate) const PATCH: Rect = Rect::new(40, 40, 64, 64);

    fn params() -> DetectionParams {
        DetectionParams::default()
    }

    #[test]
    fn test_parse_minimal_cascade() {
        let cascade = HaarCascade::from_xml(&bright_over_dark_xml(0.1)).unwrap();
        assert_eq!(cascade.window_size(), (24, 24));
        assert_eq!(cascade.stage_count(), 1);
        assert_eq!(cascade.features.len(), 1);
        assert_eq!(cascade.features[0].rects.len(), 2);
        assert!((cascade.features[0].rects[1].weight - 2.0).abs() < 1e-12);
        let node = &cascade.stages[0].classifiers[0].nodes[0];
        assert_eq!((node.left, node.right, node.feature), (0, -1, 0));
        assert!((node.threshold - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_load_missing_file() {
        let err = HaarCascade::load("/nonexistent/haarcascade.xml").unwrap_err();
        assert!(matches!(err, CascadeError::ModelNotFound(_)));
    }

    #[test]
    fn test_rejects_lbp() {
        let xml = bright_over_dark_xml(0.1).replace(">HAAR<", ">LBP<");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_tilted() {
        let xml = bright_over_dark_xml(0.1).replace("2.</_></rects>", "2.</_></rects><tilted>1</tilted>");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_feature_index_out_of_range() {
        let xml = bright_over_dark_xml(0.1).replace("0 -1 0 ", "0 -1 7 ");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_rect_outside_window() {
        let xml = bright_over_dark_xml(0.1).replace("0 0 24 12 2.", "0 20 24 12 2.");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_huge_rect() {
        let xml = bright_over_dark_xml(0.1).replace("0 0 24 12 2.", "1e30 0 1e30 12 2.");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeError::Malformed(_))
        ));
        let xml = bright_over_dark_xml(0.1).replace("0 0 24 12 2.", "0 nan 24 12 2.");
        assert!(matches!(
            HaarCascade::from_xml(&xml),
            Err(CascadeError::Malformed(_))
        ));
    }

    /// Replace the single stump with a multi-node tree.
    fn tree_xml(nodes: &str, leaves: &str) -> String {
        bright_over_dark_xml(0.1)
            .replace("0 -1 0 1e-1", nodes)
            .replace("-1. 1.</leafValues>", &format!("{leaves}</leafValues>"))
    }

    #[test]
    fn test_parses_forward_tree() {
        let xml = tree_xml("1 -1 0 1e-1 -2 -3 0 2e-1", "-1. 1. 0.5 0.25");
        let cascade = HaarCascade::from_xml(&xml).unwrap();
        assert_eq!(cascade.stages[0].classifiers[0].nodes.len(), 2);
    }

    #[test]
    fn test_rejects_tree_cycles() {
        // node 1 branches to itself
        let self_loop = tree_xml("1 -1 0 1e-1 1 -2 0 1e-1", "-1. 1. 0.5");
        assert!(matches!(
            HaarCascade::from_xml(&self_loop),
            Err(CascadeError::Malformed(_))
        ));
        // node 2 branches back to node 1; a target of 0 would mean leaf 0
        let back_edge = tree_xml(
            "1 -1 0 1e-1 2 -2 0 1e-1 1 -3 0 1e-1",
            "-1. 1. 0.5 0.25",
        );
        assert!(matches!(
            HaarCascade::from_xml(&back_edge),
            Err(CascadeError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            HaarCascade::from_xml("<opencv_storage><cascade>"),
            Err(CascadeError::Xml(_))
        ));
    }

    #[test]
    fn test_integral_rect_sum() {
        let img = Array2::from_shape_fn((5, 6), |(y, x)| (y * 6 + x) as u8);
        let ii = Integral::new(img.view());
        let expected: i64 = (1..3)
            .flat_map(|y| (2..5).map(move |x| (y * 6 + x) as i64))
            .sum();
        assert_eq!(ii.rect_sum(2, 1, 3, 2), expected);
        let expected_sq: i64 = img.iter().map(|&p| p as i64 * p as i64).sum();
        assert_eq!(ii.rect_sqsum(0, 0, 6, 5), expected_sq);
    }

    #[test]
    fn test_tree_walk_multi_node() {
        // root: f0 < 0.5 -> node 1, else leaf 0
        // node 1: f1 < 0.0 -> leaf 1, else leaf 2
        let weak = WeakClassifier {
            nodes: vec![
                TreeNode { left: 1, right: 0, feature: 0, threshold: 0.5 },
                TreeNode { left: -1, right: -2, feature: 1, threshold: 0.0 },
            ],
            leaves: vec![10.0, 20.0, 30.0],
        };
        assert_eq!(weak.predict(&|f| [0.9, 0.0][f]), 10.0);
        assert_eq!(weak.predict(&|f| [0.1, -1.0][f]), 20.0);
        assert_eq!(weak.predict(&|f| [0.1, 1.0][f]), 30.0);
    }

    #[test]
    fn test_uniform_image_has_no_detections() {
        let cascade = HaarCascade::from_xml(&bright_over_dark_xml(0.1)).unwrap();
        let img = Array2::from_elem((120, 120), 128u8);
        assert!(cascade.detect_multi_scale(img.view(), &params()).is_empty());
    }

    #[test]
    fn test_image_smaller_than_window() {
        let cascade = HaarCascade::from_xml(&bright_over_dark_xml(0.1)).unwrap();
        let img = Array2::from_elem((10, 10), 200u8);
        assert!(cascade.detect_multi_scale(img.view(), &params()).is_empty());
    }

    #[test]
    fn test_detects_patch() {
        let cascade = HaarCascade::from_xml(&bright_over_dark_xml(0.1)).unwrap();
        let faces = cascade.detect_multi_scale(patch_image().view(), &params());
        assert!(!faces.is_empty(), "expected at least one grouped detection");
        for f in &faces {
            assert!(f.intersects(&PATCH), "{f:?} should overlap the patch");
        }
    }

    #[test]
    fn test_dark_over_bright_not_detected() {
        // The only contrast is a dark band above a bright one: the feature is negative there.
        let cascade = HaarCascade::from_xml(&bright_over_dark_xml(0.1)).unwrap();
        let img = Array2::from_shape_fn((160, 160), |(y, _)| if y < 80 { 30u8 } else { 230 });
        assert!(cascade.detect_multi_scale(img.view(), &params()).is_empty());
    }

    #[test]
    fn test_group_averages_cluster() {
        let rects: Vec<Rect> = (0..6).map(|i| Rect::new(100 + i, 100, 50, 50)).collect();
        let grouped = group_rectangles(&rects, 4, GROUP_EPS);
        // mean x = 102.5 rounds away from zero
        assert_eq!(grouped, vec![Rect::new(103, 100, 50, 50)]);
    }

    #[test]
    fn test_group_drops_weak_cluster() {
        let mut rects: Vec<Rect> = (0..6).map(|i| Rect::new(i, 0, 40, 40)).collect();
        rects.extend((0..3).map(|i| Rect::new(200 + i, 200, 40, 40)));
        let grouped = group_rectangles(&rects, 4, GROUP_EPS);
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].x < 10);
    }

    #[test]
    fn test_group_suppresses_nested() {
        let mut rects: Vec<Rect> = (0..10).map(|_| Rect::new(0, 0, 100, 100)).collect();
        rects.extend((0..5).map(|_| Rect::new(30, 30, 20, 20)));
        let grouped = group_rectangles(&rects, 4, GROUP_EPS);
        assert_eq!(grouped, vec![Rect::new(0, 0, 100, 100)]);
    }

    #[test]
    fn test_group_zero_neighbors_passthrough() {
        let rects = vec![Rect::new(0, 0, 10, 10), Rect::new(1, 1, 10, 10)];
        assert_eq!(group_rectangles(&rects, 0, GROUP_EPS), rects);
    }
}
