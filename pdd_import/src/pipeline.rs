//! Sequences the decoders over a bundle and feeds the results to a store.
//!
//! Lookup tables are written before questions so that every cross-reference a
//! question carries can be resolved when it is inserted. Each image directory,
//! simple-data table and topic is one transaction; the first failure rolls its
//! unit back and ends the session. Every topic a section table points at must
//! have its `part_<n>.dbt` blob before any topic is written.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use memmap2::MmapOptions;
use pdd_formats::fingerprint::utc_year;
use pdd_formats::images::logical_name;
use pdd_formats::{
    DecodeError, Fingerprinter, FingerprintProfile, QuestionRecord, SimpleRecord, TopicOffset,
    decode_image, decode_simple_table, decode_topic, decode_topic_offsets,
};
use serde::Serialize;

use crate::error::{ImportError, Result};
use crate::paths::{file_name, files_with_extension, find_path, list_files, require_path};
use crate::settings::Settings;
use crate::store::{DataStore, NewQuestion, RecordId};

const TICKETS_DIR: &str = "tickets";
const PARTS_DIR: &str = "parts";
const TOPIC_PREFIX: &str = "part_";

#[derive(Debug, Clone, Serialize)]
pub struct FingerprintReport {
    pub executable: PathBuf,
    pub year: i32,
    pub sha256: String,
    pub profile: FingerprintProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub images: usize,
    pub comments: usize,
    pub traffregs: usize,
    pub sections: usize,
    pub topics: usize,
    pub questions: usize,
    pub answers: usize,
    pub deleted_records: usize,
}

/// Locates the executable and selects the bundle's format generation.
pub fn fingerprint_bundle(root: &Path, settings: &Settings) -> Result<FingerprintReport> {
    let executable = locate_executable(root, settings)?;
    let file = File::open(&executable).map_err(|err| ImportError::io(&executable, err))?;
    let modified = file
        .metadata()
        .and_then(|meta| meta.modified())
        .map_err(|err| ImportError::io(&executable, err))?;
    let year = utc_year(modified);
    let mmap = unsafe { MmapOptions::new().map(&file) }
        .map_err(|err| ImportError::io(&executable, err))?;

    debug!("{} last modified in {year}", executable.display());
    let identified = Fingerprinter::new(settings.fingerprint, &settings.known_builds)
        .identify(&mmap, year)?;

    Ok(FingerprintReport {
        executable,
        year,
        sha256: identified.sha256,
        profile: identified.profile,
    })
}

fn locate_executable(root: &Path, settings: &Settings) -> Result<PathBuf> {
    if let Some(name) = settings.executable.as_deref() {
        return require_path(root, &[name]);
    }
    let mut candidates = files_with_extension(root, "exe")?;
    match candidates.len() {
        0 => Err(ImportError::MissingFile("executable (*.exe)".to_string())),
        1 => Ok(candidates.remove(0)),
        count => Err(ImportError::AmbiguousExecutable { count }),
    }
}

pub struct DecodePipeline<'a, S: DataStore> {
    root: PathBuf,
    settings: &'a Settings,
    store: &'a mut S,
}

impl<'a, S: DataStore> DecodePipeline<'a, S> {
    pub fn new(root: impl Into<PathBuf>, settings: &'a Settings, store: &'a mut S) -> Self {
        DecodePipeline {
            root: root.into(),
            settings,
            store,
        }
    }

    pub fn run(self) -> Result<ImportSummary> {
        let report = fingerprint_bundle(&self.root, self.settings)?;
        self.run_with_profile(&report.profile)
    }

    /// Runs every stage after fingerprinting with an already known profile.
    pub fn run_with_profile(self, profile: &FingerprintProfile) -> Result<ImportSummary> {
        let DecodePipeline {
            root,
            settings,
            store,
        } = self;
        let mut summary = ImportSummary::default();

        for dir_name in &settings.image_dirs {
            let dir = require_path(&root, &[dir_name.as_str()])?;
            summary.images += in_unit(store, &format!("image directory {dir_name}"), |store| {
                import_images(store, &dir, profile)
            })?;
        }

        let comments = read_simple_table(&root, "comments", profile)?;
        in_unit(store, "comments", |store| {
            import_comments(store, &comments, &mut summary)
        })?;

        let traffregs = read_simple_table(&root, "traffreg", profile)?;
        in_unit(store, "traffic regulations", |store| {
            import_traffregs(store, &traffregs, &mut summary)
        })?;

        let sections = read_section_tables(&root, profile)?;
        summary.sections = in_unit(store, "sections", |store| {
            for (name, _) in &sections {
                store.insert_section(name)?;
            }
            Ok(sections.len())
        })?;
        let entries: Vec<TopicOffset> = sections
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .collect();

        let topics = topic_blobs(&root)?;
        let referenced: BTreeSet<i8> = entries.iter().map(|entry| entry.topic_number).collect();
        if let Some(missing) = referenced
            .iter()
            .find(|&&number| !topics.iter().any(|(topic, _)| *topic == number))
        {
            return Err(ImportError::MissingFile(format!(
                "{TICKETS_DIR}/{TOPIC_PREFIX}{missing}.dbt"
            )));
        }

        for (topic_index, (number, path)) in topics.into_iter().enumerate() {
            let blob = fs::read(&path).map_err(|err| ImportError::io(&path, err))?;
            let questions_per_ticket = settings.questions_per_ticket_for(topic_index);
            in_unit(store, &format!("topic {number}"), |store| {
                let topic_id = store.insert_topic(number, questions_per_ticket)?;
                let questions = decode_topic(&blob, &entries, number, profile)?;
                for question in &questions {
                    summary.answers += store_question(store, topic_id, question)?;
                }
                summary.questions += questions.len();
                Ok(())
            })?;
            summary.topics += 1;
        }

        info!(
            "imported {} topics, {} questions, {} images",
            summary.topics, summary.questions, summary.images
        );
        Ok(summary)
    }
}

/// Runs `work` inside one store transaction, rolling back on failure.
fn in_unit<S, T, F>(store: &mut S, label: &str, work: F) -> Result<T>
where
    S: DataStore,
    F: FnOnce(&mut S) -> Result<T>,
{
    store.begin()?;
    match work(store) {
        Ok(value) => {
            store.commit()?;
            info!("committed {label}");
            Ok(value)
        }
        Err(err) => {
            match store.rollback() {
                Ok(()) => warn!("rolled back {label}: {err}"),
                Err(rollback) => warn!("rolling back {label} failed: {rollback}"),
            }
            Err(err)
        }
    }
}

fn import_images<S: DataStore>(
    store: &mut S,
    dir: &Path,
    profile: &FingerprintProfile,
) -> Result<usize> {
    let files = list_files(dir)?;
    for path in &files {
        let bytes = fs::read(path).map_err(|err| ImportError::io(path, err))?;
        let image = decode_image(&file_name(path), &bytes, profile.image_magic)?;
        store.insert_image(&image)?;
    }
    Ok(files.len())
}

fn read_simple_table(
    root: &Path,
    name: &str,
    profile: &FingerprintProfile,
) -> Result<Vec<SimpleRecord>> {
    let dat_name = format!("{name}.dat");
    let dbt_name = format!("{name}.dbt");
    let dat = require_path(root, &[TICKETS_DIR, name, &dat_name])?;
    let dbt = require_path(root, &[TICKETS_DIR, name, &dbt_name])?;
    let table = fs::read(&dat).map_err(|err| ImportError::io(&dat, err))?;
    let blob = fs::read(&dbt).map_err(|err| ImportError::io(&dbt, err))?;
    let records = decode_simple_table(&table, &blob, profile)?;
    debug!("{name}: {} table slots", records.len());
    Ok(records)
}

fn import_comments<S: DataStore>(
    store: &mut S,
    records: &[SimpleRecord],
    summary: &mut ImportSummary,
) -> Result<()> {
    for record in records {
        let Some(text) = record.text.as_deref() else {
            summary.deleted_records += 1;
            continue;
        };
        if !record.image_names.is_empty() {
            debug!(
                "comment {} names images {:?}; comments carry no image links",
                record.number, record.image_names
            );
        }
        store.insert_comment(record.number, text)?;
        summary.comments += 1;
    }
    Ok(())
}

fn import_traffregs<S: DataStore>(
    store: &mut S,
    records: &[SimpleRecord],
    summary: &mut ImportSummary,
) -> Result<()> {
    for record in records {
        let Some(text) = record.text.as_deref() else {
            summary.deleted_records += 1;
            continue;
        };
        let traffreg_id = store.insert_traffreg(record.number, text)?;
        for name in &record.image_names {
            let image_id = resolve(
                store.find_image(&logical_name(name)),
                "image",
                name,
                || format!("traffic regulation {}", record.number),
            )?;
            store.link_image_traffreg(image_id, traffreg_id)?;
        }
        summary.traffregs += 1;
    }
    Ok(())
}

/// Reads every `tickets/parts/<section>.dat`, sorted by section name.
fn read_section_tables(
    root: &Path,
    profile: &FingerprintProfile,
) -> Result<Vec<(String, Vec<TopicOffset>)>> {
    let dir = require_path(root, &[TICKETS_DIR, PARTS_DIR])?;
    let mut sections = Vec::new();
    for path in files_with_extension(&dir, "dat")? {
        let name = logical_name(&file_name(&path));
        let bytes = fs::read(&path).map_err(|err| ImportError::io(&path, err))?;
        let entries = decode_topic_offsets(&bytes, profile.data_magic)?;
        debug!("section {name}: {} entries", entries.len());
        sections.push((name, entries));
    }
    sections.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(sections)
}

/// `tickets/part_<n>.dbt` blobs in ascending topic order.
fn topic_blobs(root: &Path) -> Result<Vec<(i8, PathBuf)>> {
    let Some(dir) = find_path(root, &[TICKETS_DIR])? else {
        return Err(ImportError::MissingFile(TICKETS_DIR.to_string()));
    };
    let mut topics = Vec::new();
    for path in files_with_extension(&dir, "dbt")? {
        let name = file_name(&path);
        let stem = logical_name(&name);
        let Some(number) = stem.strip_prefix(TOPIC_PREFIX) else {
            debug!("{name} is not a topic blob");
            continue;
        };
        let number = number
            .parse::<i8>()
            .map_err(|err| DecodeError::MalformedTable {
                table: name.clone(),
                reason: format!("topic number '{number}': {err}"),
            })?;
        topics.push((number, path));
    }
    topics.sort();
    Ok(topics)
}

fn store_question<S: DataStore>(
    store: &mut S,
    topic_id: RecordId,
    question: &QuestionRecord,
) -> Result<usize> {
    let context = || {
        let preview: String = question.text.chars().take(40).collect();
        format!("topic {} question {preview:?}", question.topic_number)
    };

    let image_id = match question.image_name.as_deref() {
        Some(name) => Some(resolve(
            store.find_image(&logical_name(name)),
            "image",
            name,
            context,
        )?),
        None => None,
    };
    let comment_id = match question.comment_number {
        Some(number) => Some(resolve(
            store.find_comment(number),
            "comment",
            &number.to_string(),
            context,
        )?),
        None => None,
    };
    let section_ids = question
        .section_names
        .iter()
        .map(|name| resolve(store.find_section(name), "section", name, context))
        .collect::<Result<Vec<_>>>()?;
    let traffreg_ids = question
        .traffreg_numbers
        .iter()
        .map(|&number| {
            resolve(
                store.find_traffreg(number),
                "traffic regulation",
                &number.to_string(),
                context,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    let question_id = store.insert_question(&NewQuestion {
        topic_id,
        text: &question.text,
        image_id,
        advice: question.advice.as_deref(),
        comment_id,
    })?;
    for (position, answer) in question.answers.iter().enumerate() {
        let is_correct = position == question.correct_answer_index;
        store.insert_answer(question_id, position, answer, is_correct)?;
    }
    for section_id in section_ids {
        store.link_question_section(question_id, section_id)?;
    }
    for traffreg_id in traffreg_ids {
        store.link_question_traffreg(question_id, traffreg_id)?;
    }
    Ok(question.answers.len())
}

fn resolve(
    found: Option<RecordId>,
    kind: &'static str,
    key: &str,
    context: impl FnOnce() -> String,
) -> Result<RecordId> {
    found.ok_or_else(|| ImportError::UnresolvedReference {
        kind,
        key: key.to_string(),
        context: context(),
    })
}
