//! Subcommands and their execution against a database.

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Subcommand;
use docrel_core::{Database, DocumentStore, FindOptions, MemoryStore, RelationRef, RequestContext, SledStore};
use docrel_proto::{DocId, FilterExpr, OrderSpec, Selection, Stage, Value};
use serde_json::json;
use tracing::{info, warn};

use crate::config::{CliConfig, StoreConfig};
use crate::error::Error;
use crate::schema::sample_world;

/// What to do.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Insert sample countries, cities, users and files.
    Seed {
        /// Countries to create.
        #[arg(long, default_value_t = 3)]
        countries: usize,

        /// Cities per country.
        #[arg(long, default_value_t = 4)]
        cities: usize,

        /// Users to create, each with one uploaded file.
        #[arg(long, default_value_t = 6)]
        users: usize,
    },

    /// Find documents of an entity.
    Find {
        /// Entity name.
        entity: String,

        /// JSON filter, e.g. '{"country.name": "Iran"}'.
        #[arg(long)]
        filter: Option<String>,

        /// JSON projection, e.g. '{"name": 1, "country": 1}'.
        #[arg(long)]
        select: Option<String>,

        /// Sort key as `field` or `field:desc`; repeatable.
        #[arg(long)]
        order: Vec<String>,

        /// Results to skip.
        #[arg(long, default_value_t = 0)]
        skip: usize,

        /// Results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run an aggregation pipeline.
    Aggregate {
        /// Entity name.
        entity: String,

        /// JSON pipeline, e.g. '[{"$lookup": "country"}, {"$limit": 5}]'.
        pipeline: String,

        /// JSON projection applied to the pipeline output.
        #[arg(long)]
        select: Option<String>,

        /// Results to skip.
        #[arg(long, default_value_t = 0)]
        skip: usize,

        /// Results to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete a document.
    Delete {
        /// Entity name.
        entity: String,

        /// Document identifier (hex).
        id: DocId,

        /// Also delete referrers left without a required reference.
        #[arg(long)]
        cascade: bool,
    },

    /// Check that both sides of every relation agree.
    Audit,
}

/// An opened database plus the handle needed to flush it.
pub struct Session {
    /// The database.
    pub db: Database,
    sled: Option<Arc<SledStore>>,
}

impl Session {
    /// Open the configured store over the sample world.
    pub fn open(config: &CliConfig) -> Result<Self, Error> {
        let graph = Arc::new(sample_world()?);
        let (store, sled): (Arc<dyn DocumentStore>, Option<Arc<SledStore>>) = match &config.store {
            StoreConfig::Sled(storage) => {
                let sled = Arc::new(SledStore::open(storage.clone())?);
                let store: Arc<dyn DocumentStore> = sled.clone();
                (store, Some(sled))
            }
            StoreConfig::Memory => {
                let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
                (store, None)
            }
        };
        Ok(Self {
            db: Database::open(graph, store, config.engine.clone()),
            sled,
        })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        if let Some(sled) = &self.sled {
            sled.flush()?;
        }
        Ok(())
    }
}

/// Run a command and render its output.
pub fn execute(db: &Database, ctx: &RequestContext, command: Command) -> Result<String, Error> {
    let output = match command {
        Command::Seed {
            countries,
            cities,
            users,
        } => seed(db, ctx, countries, cities, users)?,
        Command::Find {
            entity,
            filter,
            select,
            order,
            skip,
            limit,
        } => {
            let mut options = FindOptions::new()
                .with_selection(parse_selection(select.as_deref())?)
                .with_skip(skip);
            if let Some(filter) = filter {
                options = options.with_filter(FilterExpr::from_json(&serde_json::from_str(&filter)?)?);
            }
            for key in &order {
                options = options.with_order(parse_order(key)?);
            }
            if let Some(limit) = limit {
                options = options.with_limit(limit);
            }
            serde_json::to_value(db.find(&entity, &options)?)?
        }
        Command::Aggregate {
            entity,
            pipeline,
            select,
            skip,
            limit,
        } => {
            let stages = Stage::pipeline_from_json(&serde_json::from_str(&pipeline)?)?;
            let selection = parse_selection(select.as_deref())?;
            serde_json::to_value(db.aggregate(&entity, &stages, &selection, skip, limit)?)?
        }
        Command::Delete {
            entity,
            id,
            cascade,
        } => {
            let outcome = db.delete(ctx, &entity, id, cascade)?;
            let deleted: Vec<serde_json::Value> = outcome
                .cascade
                .deleted
                .iter()
                .map(|(entity, id)| json!({ "entity": entity, "_id": id.to_hex() }))
                .collect();
            json!({
                "success": outcome.success,
                "deleted": deleted,
                "detached": outcome.cascade.detached,
            })
        }
        Command::Audit => {
            let report = db.audit()?;
            if !report.is_clean() {
                for violation in &report.violations {
                    warn!(%violation, "inconsistent relation");
                }
                return Err(Error::AuditFailed(report.violations.len()));
            }
            json!({ "documents": report.documents, "violations": 0 })
        }
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Parse `field`, `field:asc` or `field:desc`.
pub fn parse_order(key: &str) -> Result<OrderSpec, Error> {
    match key.rsplit_once(':') {
        None => Ok(OrderSpec::asc(key)),
        Some((field, "asc")) if !field.is_empty() => Ok(OrderSpec::asc(field)),
        Some((field, "desc")) if !field.is_empty() => Ok(OrderSpec::desc(field)),
        Some(_) => Err(Error::InvalidArgument(format!(
            "order must be `field`, `field:asc` or `field:desc`, got {key:?}"
        ))),
    }
}

fn parse_selection(select: Option<&str>) -> Result<Selection, Error> {
    match select {
        Some(json) => Ok(Selection::from_json(&serde_json::from_str(json)?)?),
        None => Ok(Selection::Include),
    }
}

fn fields<const N: usize>(pairs: [(&str, Value); N]) -> BTreeMap<String, Value> {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Deterministic pseudo-random population.
fn population(seed: usize, scale: i64) -> i64 {
    let mixed = (seed as u64).wrapping_mul(2_654_435_761) % 1000;
    (mixed as i64 + 1) * scale
}

fn seed(
    db: &Database,
    ctx: &RequestContext,
    countries: usize,
    cities: usize,
    users: usize,
) -> Result<serde_json::Value, Error> {
    let mut country_ids = Vec::with_capacity(countries);
    for c in 0..countries {
        let doc = db.insert(
            ctx,
            "country",
            fields([
                ("name", Value::from(format!("Country {c}"))),
                ("population", Value::from(population(c, 100_000))),
                ("abb", Value::from(format!("C{c}"))),
            ]),
            &[],
        )?;
        country_ids.push(doc.id);
    }

    // Cities alternate between countries; the first city of each is its capital.
    let mut city_ids: Vec<(DocId, DocId)> = Vec::with_capacity(countries * cities);
    for n in 0..cities {
        for (c, country) in country_ids.iter().enumerate() {
            let index = c * cities + n;
            let reference = RelationRef::to("country", *country).with_related("capital", n == 0);
            let doc = db.insert(
                ctx,
                "city",
                fields([
                    ("name", Value::from(format!("City {c}-{n}"))),
                    ("population", Value::from(population(index + 7, 1_000))),
                ]),
                &[reference],
            )?;
            city_ids.push((doc.id, *country));
        }
    }

    let mut files = 0;
    if !city_ids.is_empty() {
        for u in 0..users {
            let (home, country) = city_ids[u % city_ids.len()];
            let (other, _) = city_ids[(u * 3 + 1) % city_ids.len()];
            let mut lived = vec![home];
            if other != home {
                lived.push(other);
            }
            let user = db.insert(
                ctx,
                "user",
                fields([
                    ("name", Value::from(format!("User {u}"))),
                    ("age", Value::from(18 + (u as i64 * 7) % 50)),
                    ("level", Value::from(if u == 0 { "Admin" } else { "Normal" })),
                ]),
                &[
                    RelationRef::new("livedCities", lived),
                    RelationRef::to("mostLovedCity", other),
                    RelationRef::to("country", country),
                ],
            )?;
            db.insert(
                ctx,
                "file",
                fields([
                    ("name", Value::from(format!("avatar-{u}.png"))),
                    ("type", Value::from("image/png")),
                    ("size", Value::from(1024 * (u as i64 + 1))),
                ]),
                &[RelationRef::to("uploader", user.id)],
            )?;
            files += 1;
        }
    }

    let seeded_users = if city_ids.is_empty() { 0 } else { users };
    info!(
        countries = country_ids.len(),
        cities = city_ids.len(),
        users = seeded_users,
        files,
        "seeded sample world"
    );
    Ok(json!({
        "countries": country_ids.len(),
        "cities": city_ids.len(),
        "users": seeded_users,
        "files": files,
    }))
}
