//! Checkpoint key names, sentinels and configuration defaults.

/// Library version reported by the print callback at train start.
pub const GRIDTRAIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returned by linearized size queries when no dataset is attached.
pub const UNSET_LINEARIZED_SIZE: i64 = -1;

/// Label size a regression task always reports.
pub const REGRESSION_LABEL_SIZE: i64 = 1;

/// Dataset progress keys, in header order.
pub const READER_TRAIN_PROCESSED: &str = "reader_train_processed";
pub const READER_TRAIN_TOTAL: &str = "reader_train_total";
pub const READER_TEST_PROCESSED: &str = "reader_test_processed";
pub const READER_TEST_TOTAL: &str = "reader_test_total";
pub const READER_VALIDATE_PROCESSED: &str = "reader_validate_processed";
pub const READER_VALIDATE_TOTAL: &str = "reader_validate_total";

/// All six dataset progress keys in the order they are written.
pub const DATASET_PROGRESS_KEYS: [&str; 6] = [
    READER_TRAIN_PROCESSED,
    READER_TRAIN_TOTAL,
    READER_TEST_PROCESSED,
    READER_TEST_TOTAL,
    READER_VALIDATE_PROCESSED,
    READER_VALIDATE_TOTAL,
];

/// Extension carried by matrix blobs on disk.
pub const MATRIX_FILE_EXTENSION: &str = "bin";

/// Name of the checkpoint manifest file.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Checkpoint layout version written to and accepted from the manifest.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "GRIDTRAIN_";

/// Default mini-batch size.
pub const DEFAULT_MINI_BATCH_SIZE: usize = 64;

/// Default optimizer learning rate.
pub const DEFAULT_LEARNING_RATE: f32 = 0.001;

/// Default RMSprop decay.
pub const DEFAULT_RHO: f32 = 0.9;

/// Default RMSprop denominator guard.
pub const DEFAULT_EPSILON: f32 = 1e-6;

/// Width of the dashed rule printed around epoch banners.
pub const EPOCH_RULE_WIDTH: usize = 59;
