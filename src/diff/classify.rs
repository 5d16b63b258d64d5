//! Per-pixel change classification between two timepoints.

use serde::Serialize;

use super::binarize::BinaryMask;
use super::Execution;
use crate::error::DiffError;

/// Change class of a single pixel.
///
/// The discriminant doubles as the index into overlay palettes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DiffClass {
    /// Absent at both timepoints
    Background = 0,
    /// Absent at baseline, present at follow-up
    Growth = 1,
    /// Present at baseline, absent at follow-up
    Shrinkage = 2,
    /// Present at both timepoints
    Stable = 3,
}

impl DiffClass {
    pub const ALL: [DiffClass; 4] = [
        DiffClass::Background,
        DiffClass::Growth,
        DiffClass::Shrinkage,
        DiffClass::Stable,
    ];

    /// Classify from the two presence flags.
    #[inline]
    pub fn from_presence(baseline: bool, follow_up: bool) -> Self {
        match (baseline, follow_up) {
            (false, true) => DiffClass::Growth,
            (true, false) => DiffClass::Shrinkage,
            (true, true) => DiffClass::Stable,
            (false, false) => DiffClass::Background,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Pixel counts per class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassCounts {
    pub growth: u64,
    pub shrinkage: u64,
    pub stable: u64,
    pub background: u64,
}

impl ClassCounts {
    #[inline]
    fn record(&mut self, class: DiffClass) {
        match class {
            DiffClass::Growth => self.growth += 1,
            DiffClass::Shrinkage => self.shrinkage += 1,
            DiffClass::Stable => self.stable += 1,
            DiffClass::Background => self.background += 1,
        }
    }

    /// Count for one class.
    pub fn get(&self, class: DiffClass) -> u64 {
        match class {
            DiffClass::Growth => self.growth,
            DiffClass::Shrinkage => self.shrinkage,
            DiffClass::Stable => self.stable,
            DiffClass::Background => self.background,
        }
    }

    /// Sum over all classes; equals the pixel count of the compared masks.
    pub fn total(&self) -> u64 {
        self.growth + self.shrinkage + self.stable + self.background
    }

    /// Associative merge of partial counts.
    pub fn merge(self, other: Self) -> Self {
        Self {
            growth: self.growth + other.growth,
            shrinkage: self.shrinkage + other.shrinkage,
            stable: self.stable + other.stable,
            background: self.background + other.background,
        }
    }
}

/// One [`DiffClass`] per pixel, aligned with the input masks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap {
    width: u32,
    height: u32,
    classes: Vec<DiffClass>,
}

impl ClassMap {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class at `(x, y)`.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    pub fn get(&self, x: u32, y: u32) -> DiffClass {
        self.classes[y as usize * self.width as usize + x as usize]
    }

    /// Row-major classes.
    pub fn as_slice(&self) -> &[DiffClass] {
        &self.classes
    }
}

/// Output of the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub class_map: ClassMap,
    pub counts: ClassCounts,
}

/// Classify every pixel of two equally sized masks in a single pass.
pub fn classify(baseline: &BinaryMask, follow_up: &BinaryMask) -> Result<Classification, DiffError> {
    check_dimensions(baseline, follow_up)?;

    let mut counts = ClassCounts::default();
    let classes = baseline
        .as_slice()
        .iter()
        .zip(follow_up.as_slice())
        .map(|(&b, &f)| {
            let class = DiffClass::from_presence(b, f);
            counts.record(class);
            class
        })
        .collect();

    Ok(Classification {
        class_map: ClassMap {
            width: baseline.width(),
            height: baseline.height(),
            classes,
        },
        counts,
    })
}

/// Classify with rows partitioned across the rayon pool.
///
/// Produces exactly the same map and counts as [`classify`].
#[cfg(feature = "rayon")]
pub fn classify_parallel(
    baseline: &BinaryMask,
    follow_up: &BinaryMask,
) -> Result<Classification, DiffError> {
    use rayon::prelude::*;

    check_dimensions(baseline, follow_up)?;

    let width = baseline.width() as usize;
    let mut classes = vec![DiffClass::Background; baseline.len()];
    let counts = classes
        .par_chunks_mut(width)
        .zip(
            baseline
                .as_slice()
                .par_chunks(width)
                .zip(follow_up.as_slice().par_chunks(width)),
        )
        .map(|(out, (base_row, follow_row))| {
            let mut row_counts = ClassCounts::default();
            for ((slot, &b), &f) in out.iter_mut().zip(base_row).zip(follow_row) {
                *slot = DiffClass::from_presence(b, f);
                row_counts.record(*slot);
            }
            row_counts
        })
        .reduce(ClassCounts::default, ClassCounts::merge);

    Ok(Classification {
        class_map: ClassMap {
            width: baseline.width(),
            height: baseline.height(),
            classes,
        },
        counts,
    })
}

/// Classify using the requested execution strategy.
pub fn classify_with(
    baseline: &BinaryMask,
    follow_up: &BinaryMask,
    execution: Execution,
) -> Result<Classification, DiffError> {
    match execution {
        #[cfg(feature = "rayon")]
        Execution::Parallel => classify_parallel(baseline, follow_up),
        _ => classify(baseline, follow_up),
    }
}

fn check_dimensions(baseline: &BinaryMask, follow_up: &BinaryMask) -> Result<(), DiffError> {
    if baseline.dimensions() != follow_up.dimensions() {
        return Err(DiffError::DimensionMismatch {
            baseline_width: baseline.width(),
            baseline_height: baseline.height(),
            follow_up_width: follow_up.width(),
            follow_up_height: follow_up.height(),
        });
    }
    Ok(())
}
