//! Trial-matrix algebra for speaker/speech verification evaluation.
//!
//! Represents, combines, partitions, and serializes the trial matrices that
//! relate enrolled models (rows) to test segments (columns):
//!
//! 1. [`IdCatalog`]: ordered, de-duplicated identifier axes with set algebra
//! 2. [`TrialNdx`]: which (model, segment) pairs are eligible to score
//! 3. [`TrialKey`]: ground-truth target / non-target labels
//! 4. [`TrialScores`]: the score matrix plus its validity mask
//!
//! # Parallel evaluation
//!
//! Workers call `split` to obtain disjoint blocks of the grid, score them
//! independently with external collaborators, and a coordinator reconstructs
//! the full matrix with `merge`. Split blocks tile the grid exactly, so no
//! two workers ever hold overlapping state and the merged result equals the
//! unsplit original.
//!
//! # Containers
//!
//! Each matrix type saves to a dense binary container (byte-exact round
//! trips) or a sparse one-trial-per-line text format; see [`Format`].
//!
//! # Usage
//!
//! ```
//! use sveval_trials::{IdCatalog, TrialKey, TrialScores, Mat};
//!
//! let models = IdCatalog::new(["spkA", "spkB"])?;
//! let segs = IdCatalog::new(["utt1", "utt2"])?;
//!
//! let mut tar = Mat::zeros(2, 2);
//! tar[(0, 0)] = true;
//! let mut non = Mat::zeros(2, 2);
//! non[(0, 1)] = true;
//! let key = TrialKey::new(models.clone(), segs.clone(), tar, non)?;
//!
//! let mut scores = TrialScores::empty(models, segs);
//! scores.set_score("spkA", "utt1", 1.0)?;
//! scores.set_score("spkA", "utt2", -1.0)?;
//!
//! let (tar, non) = scores.get_tar_non(&key)?;
//! assert_eq!(tar, [1.0]);
//! assert_eq!(non, [-1.0]);
//! # Ok::<(), sveval_trials::TrialsError>(())
//! ```

mod catalog;
mod error;
mod io;
mod key;
mod matrix;
mod ndx;
mod partition;
mod scores;

pub use catalog::IdCatalog;
pub use error::{TrialsError, TrialsResult};
pub use io::Format;
pub use key::TrialKey;
pub use matrix::Mat;
pub use ndx::{TrialNdx, TrialView};
pub use scores::TrialScores;
