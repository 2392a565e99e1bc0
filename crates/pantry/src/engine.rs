//! Upload pipeline: resolve, validate, then upload cookbooks one at a time.

use std::collections::BTreeSet;
use std::time::Instant;

use chrono::Utc;
use pantry_types::{
    ProcessedCookbook, ResolvedCookbook, SkipReason, UploadOptions, UploadOutcome,
};

use crate::closure::resolve_closure;
use crate::error::PantryError;
use crate::lockfile::Lockfile;
use crate::metadata;
use crate::store::{Store, StoreSession, UploadFailure};
use crate::validate::Validator;

/// Receives progress lines and per-cookbook outcomes.
///
/// `uploaded`/`skipped` may fail; the engine downgrades such failures to a
/// warning and carries on.
pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);

    fn uploaded(&mut self, cookbook: &ResolvedCookbook) -> anyhow::Result<()> {
        self.info(&format!("{}: uploaded", cookbook.label()));
        Ok(())
    }

    fn skipped(&mut self, cookbook: &ResolvedCookbook, reason: SkipReason) -> anyhow::Result<()> {
        self.info(&format!("{}: skipped ({reason})", cookbook.label()));
        Ok(())
    }
}

/// Drives one upload run: resolve, validate, then upload one cookbook at a time.
pub struct Uploader<'a> {
    lockfile: &'a dyn Lockfile,
    validator: &'a dyn Validator,
    store: &'a dyn Store,
}

impl<'a> Uploader<'a> {
    pub fn new(lockfile: &'a dyn Lockfile, validator: &'a dyn Validator, store: &'a dyn Store) -> Self {
        Self {
            lockfile,
            validator,
            store,
        }
    }

    /// The cookbooks a run would process, in upload order.
    ///
    /// With no names this is the closure of the lockfile's declared
    /// dependencies. Explicit names are taken as given: each is looked up
    /// directly and their dependencies are *not* added.
    pub fn plan(&self, names: &[String]) -> Result<Vec<ResolvedCookbook>, PantryError> {
        let order = if names.is_empty() {
            resolve_closure(self.lockfile, &self.lockfile.root_names())?
        } else {
            let mut seen = BTreeSet::new();
            names
                .iter()
                .filter(|n| seen.insert(n.as_str()))
                .cloned()
                .collect()
        };

        order
            .iter()
            .map(|name| self.lockfile.retrieve(name))
            .collect()
    }

    /// Run the validation barrier over a batch.
    pub fn validate(&self, cookbooks: &[ResolvedCookbook]) -> Result<(), PantryError> {
        self.validator.validate_all(cookbooks)?;
        Ok(())
    }

    /// Upload `names` (or the full closure when empty).
    ///
    /// Returns the processed cookbooks in upload order. The first fatal
    /// error ends the run; nothing after it is attempted and nothing already
    /// uploaded is rolled back.
    pub fn run(
        &self,
        names: &[String],
        opts: &UploadOptions,
        reporter: &mut dyn Reporter,
    ) -> Result<Vec<ProcessedCookbook>, PantryError> {
        let cookbooks = self.plan(names)?;
        reporter.info(&format!("resolved {} cookbook(s)", cookbooks.len()));

        if opts.validate {
            reporter.info("validating cookbooks...");
            if let Err(e) = self.validate(&cookbooks) {
                reporter.error(&e.to_string());
                return Err(e);
            }
        } else {
            reporter.warn("skipping validation");
        }

        let mut session = self.store.connect().map_err(PantryError::Store)?;
        let mut processed = Vec::with_capacity(cookbooks.len());

        for mut cookbook in cookbooks {
            let label = cookbook.label();
            let started_at = Utc::now();
            let start = Instant::now();
            reporter.info(&format!("{label}: uploading..."));

            let outcome = match upload_one(session.as_mut(), &mut cookbook, opts) {
                Ok(outcome) => outcome,
                Err(e) => {
                    reporter.error(&describe(&e));
                    return Err(e);
                }
            };

            let notified = match &outcome {
                UploadOutcome::Skipped { reason } => {
                    reporter.warn(&format!("{label}: version is frozen on the store; skipping"));
                    reporter.skipped(&cookbook, *reason)
                }
                _ => reporter.uploaded(&cookbook),
            };
            if let Err(e) = notified {
                reporter.warn(&format!("{label}: reporter failed: {e:#}"));
            }

            processed.push(ProcessedCookbook {
                cookbook,
                outcome,
                started_at,
                finished_at: Utc::now(),
                duration_ms: start.elapsed().as_millis(),
            });
        }

        Ok(processed)
    }
}

/// The error followed by its causes, `: `-separated.
fn describe(err: &PantryError) -> String {
    let mut msg = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

/// One upload attempt. The compiled metadata lives exactly as long as this
/// call, so it is gone before the next cookbook starts whatever happened here.
fn upload_one(
    session: &mut dyn StoreSession,
    cookbook: &mut ResolvedCookbook,
    opts: &UploadOptions,
) -> Result<UploadOutcome, PantryError> {
    let compiled = metadata::compile(cookbook)?;
    cookbook.compiled_metadata = Some(compiled.path().to_path_buf());

    let result = session.upload(cookbook, opts.flags());
    drop(compiled);
    cookbook.compiled_metadata = None;

    match result {
        Ok(ack) => {
            cookbook.frozen = ack.frozen;
            Ok(UploadOutcome::Uploaded)
        }
        Err(UploadFailure::Frozen(_)) => {
            cookbook.frozen = true;
            if opts.halt_on_frozen {
                Err(PantryError::FrozenPackage {
                    name: cookbook.name.clone(),
                    version: cookbook.version.clone(),
                })
            } else {
                Ok(UploadOutcome::Skipped {
                    reason: SkipReason::AlreadyFrozen,
                })
            }
        }
        Err(UploadFailure::Other(source)) => Err(PantryError::Upload {
            name: cookbook.name.clone(),
            version: cookbook.version.clone(),
            source,
        }),
    }
}
