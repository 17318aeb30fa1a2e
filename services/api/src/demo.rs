use crate::infra::{build_scoring_service, load_submissions, parse_grade, parse_session};
use chrono::{Datelike, Local};
use clap::Args;
use naac_score::config::ScoringConfig;
use naac_score::error::AppError;
use naac_score::scoring::ingest::{self, ImportedSubmission};
use naac_score::scoring::{
    GradeBand, InstitutionId, InstitutionSummary, MetricCatalog, MetricPayload,
    ResponseSubmission, ScoreLookup, ScoringServiceError, SessionYear, ValidationError,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Args, Debug, Default)]
pub(crate) struct CatalogArgs {
    /// Catalog CSV to validate and print instead of the configured catalog
    #[arg(long)]
    pub(crate) csv: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Responses CSV export (institution_id,session,metric_code,type,...)
    #[arg(long)]
    pub(crate) responses: PathBuf,
    /// Institution to score
    #[arg(long)]
    pub(crate) institution: String,
    /// Session year to score (2024 or 2024-25)
    #[arg(long, value_parser = parse_session)]
    pub(crate) session: SessionYear,
    /// Desired grade used for target comparisons
    #[arg(long, value_parser = parse_grade)]
    pub(crate) target_grade: Option<GradeBand>,
    /// Print the summary as JSON instead of a table
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Session year to score. Defaults to the academic year in progress.
    #[arg(long, value_parser = parse_session)]
    pub(crate) session: Option<SessionYear>,
    /// Desired grade used for target comparisons
    #[arg(long, value_parser = parse_grade)]
    pub(crate) target_grade: Option<GradeBand>,
}

pub(crate) fn run_catalog(args: CatalogArgs) -> Result<(), AppError> {
    let config = match args.csv {
        Some(csv) => ScoringConfig {
            catalog_csv: Some(csv),
            ..ScoringConfig::default()
        },
        None => scoring_config()?,
    };

    let catalog = config.load_catalog()?;
    render_catalog(&catalog);
    Ok(())
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let ScoreArgs {
        responses,
        institution,
        session,
        target_grade,
        json,
    } = args;

    let config = scoring_config()?;
    let service = build_scoring_service(&config)?;
    let import = ingest::from_path(&responses)?;
    let report = load_submissions(&service, import);

    if !json {
        println!(
            "Loaded {} responses from {} ({} rejected)",
            report.accepted,
            responses.display(),
            report.rejected.len()
        );
        for (line, reason) in &report.rejected {
            println!("  line {line}: {reason}");
        }
    }

    let institution = InstitutionId(institution);
    match service.summary(&institution, session, target_grade)? {
        ScoreLookup::Found(summary) if json => match serde_json::to_string_pretty(&summary) {
            Ok(body) => println!("{body}"),
            Err(err) => println!("Summary unavailable: {err}"),
        },
        ScoreLookup::Found(summary) => render_summary(&summary),
        ScoreLookup::NoData => println!(
            "No score data available for {} in session {}",
            institution, session
        ),
    }

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let session = match args.session {
        Some(session) => session,
        None => current_session()?,
    };

    let config = scoring_config()?;
    let service = build_scoring_service(&config)?;
    let report = load_submissions(&service, demo_submissions(session));

    println!("NAAC provisional scoring demo");
    println!(
        "Seeded {} responses for {} across sessions {}..={}",
        report.accepted,
        DEMO_INSTITUTION,
        session.year() - 4,
        session
    );

    let institution = InstitutionId(DEMO_INSTITUTION.to_string());
    match service.summary(&institution, session, args.target_grade)? {
        ScoreLookup::Found(summary) => render_summary(&summary),
        ScoreLookup::NoData => println!("No score data available"),
    }

    Ok(())
}

fn scoring_config() -> Result<ScoringConfig, AppError> {
    Ok(naac_score::config::AppConfig::load()?.scoring)
}

fn current_session() -> Result<SessionYear, AppError> {
    // Academic sessions start in June.
    let today = Local::now().date_naive();
    let year = if today.month() >= 6 {
        today.year()
    } else {
        today.year() - 1
    };
    SessionYear::new(year)
        .map_err(|err| AppError::from(ScoringServiceError::from(ValidationError::from(err))))
}

const DEMO_INSTITUTION: &str = "demo-college";

fn demo_submissions(session: SessionYear) -> Vec<ImportedSubmission> {
    let latest = session.year();
    let mut rows = Vec::new();
    let mut push = |session: i32, code: &str, payload: MetricPayload| {
        let line = rows.len() + 1;
        rows.push(ImportedSubmission {
            line,
            submission: ResponseSubmission {
                institution_id: DEMO_INSTITUTION.to_string(),
                session: session.to_string(),
                metric_code: code.to_string(),
                payload,
            },
        });
    };

    for (offset, (admitted, sanctioned)) in [(540.0, 600.0), (560.0, 600.0), (590.0, 660.0)]
        .into_iter()
        .enumerate()
    {
        push(
            latest - offset as i32,
            "2.1.1",
            MetricPayload::Ratio {
                numerator: admitted,
                denominator: sanctioned,
            },
        );
    }
    for (offset, passed) in [(412.0, 450.0), (398.0, 440.0)].into_iter().enumerate() {
        push(
            latest - offset as i32,
            "2.6.3",
            MetricPayload::Ratio {
                numerator: passed.0,
                denominator: passed.1,
            },
        );
    }
    push(
        latest,
        "2.4.3",
        MetricPayload::Figures {
            amount: 1_140.0,
            base: 95.0,
        },
    );
    push(latest, "1.1.3", MetricPayload::OptionCount { selected: 2 });
    push(latest, "1.4.1", MetricPayload::OptionCount { selected: 4 });
    push(latest, "6.2.3", MetricPayload::OptionCount { selected: 3 });
    push(latest, "7.1.2", MetricPayload::OptionCount { selected: 3 });
    push(latest, "7.1.4", MetricPayload::OptionCount { selected: 5 });

    let items: BTreeMap<String, bool> = [
        ("code_published", true),
        ("monitoring_committee", true),
        ("ethics_programs", false),
        ("awareness_programs", true),
    ]
    .into_iter()
    .map(|(item, ticked)| (item.to_string(), ticked))
    .collect();
    push(latest, "7.1.10", MetricPayload::Checklist { items });

    rows
}

pub(crate) fn render_catalog(catalog: &MetricCatalog) {
    println!("Metric catalog ({} metrics)", catalog.len());
    for criterion in catalog.criteria() {
        println!(
            "\nCriterion {} - {} (weight {:.2})",
            criterion.key, criterion.title, criterion.weight
        );
        for sub in catalog.sub_criteria_of(&criterion.key) {
            println!("  {} {} (weight {})", sub.key, sub.title, sub.weight);
            for metric in catalog.metrics_of(&sub.key) {
                println!(
                    "    {:<7} {:<24} {}",
                    metric.code.as_str(),
                    metric.kind.label(),
                    metric.title
                );
            }
        }
    }
}

pub(crate) fn render_summary(summary: &InstitutionSummary) {
    println!(
        "\n{} | session {} | overall {:.2}% ({}) | target {} = {:.2}% -> {}",
        summary.institution_id,
        summary.session,
        summary.score,
        summary.grade,
        summary.target_grade,
        summary.target,
        summary.status_label
    );

    for criterion in &summary.criteria {
        println!(
            "- Criterion {}: {:.2}% ({}) {}",
            criterion.key, criterion.score, criterion.grade, criterion.status_label
        );
        for sub in &criterion.sub_criteria {
            println!(
                "    {} {:.2}% ({}) {}",
                sub.key, sub.score, sub.grade, sub.status_label
            );
        }
    }

    if summary.partial {
        println!("\nPartial result; metrics excluded from scoring:");
        for error in &summary.errors {
            println!("  - {}: {}", error.code, error.message);
        }
    }
}
