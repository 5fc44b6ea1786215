//! Select command implementation

use crate::cli::SelectArgs;
use crate::config::load_with_overrides;
use crate::output::OutputWriter;
use anyhow::{Context, Result};
use geosite_core::config::CliConfigOverrides;
use geosite_core::models::{RequirementSet, SiteId};
use geosite_retrieval::{Narration, SelectionOutcome, SelectionPipeline, SelectionReport, SelectionResult};
use std::path::Path;
use tabled::Tabled;

pub async fn execute(args: SelectArgs, output: &OutputWriter, config_path: Option<&Path>) -> Result<()> {
    let overrides = CliConfigOverrides {
        dataset_path: args.dataset,
        max_sites: args.max_sites,
        min_distance_m: args.min_distance,
        enable_spatial_optimization: args.spatial.then_some(true),
        enable_route_order: args.route.then_some(true),
        enable_struct_filters: args.struct_filters.then_some(true),
        enable_narration: args.no_narrate.then_some(false),
        llm_enabled: args.no_llm.then_some(false),
        ..Default::default()
    };
    let config = load_with_overrides(config_path, overrides)?
        .resolve()
        .context("Invalid configuration")?;

    let pipeline = SelectionPipeline::from_config(config).context("Failed to initialize the selection pipeline")?;
    let anchors: Vec<SiteId> = args.anchors.into_iter().map(SiteId).collect();
    let report = pipeline.run_with_anchors(&args.request, &anchors).await;

    if output.is_json() {
        return output.result(&report);
    }

    show_requirements(&report.requirements, output);
    for diagnostic in &report.diagnostics {
        output.warning(format!("[{}] {}", diagnostic.stage.as_str(), diagnostic.message));
    }

    match &report.outcome {
        SelectionOutcome::NoCandidates => {
            output.warning("No candidate sites matched any requirement");
        }
        SelectionOutcome::Selected(result) => {
            show_ranking(result, output);
            show_route(result, output);
            show_narration(result, output);
            output.success(format!(
                "Selected {} sites in {} ms",
                result.ranked.len(),
                elapsed_ms(&report)
            ));
        }
    }
    Ok(())
}

fn elapsed_ms(report: &SelectionReport) -> i64 {
    (report.finished_at - report.started_at).num_milliseconds()
}

fn show_requirements(requirements: &RequirementSet, output: &OutputWriter) {
    output.section("Requirements");
    for query in &requirements.sub_queries {
        match &query.negative {
            Some(negative) => output.kv("Wanted", format!("{} (not: {})", query.positive, negative)),
            None => output.kv("Wanted", &query.positive),
        }
    }
    for constraint in &requirements.hard_constraints {
        let prefix = if constraint.is_negative { "must not" } else { "must" };
        output.kv(
            format!("Hard [{}]", constraint.category.label()),
            format!("{} {}", prefix, constraint.text),
        );
    }
}

fn show_ranking(result: &SelectionResult, output: &OutputWriter) {
    output.section("Ranked Sites");

    #[derive(Tabled)]
    struct SiteRow {
        #[tabled(rename = "#")]
        rank: usize,
        #[tabled(rename = "ID")]
        id: u64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Final")]
        final_score: String,
        #[tabled(rename = "Vector")]
        vector: String,
        #[tabled(rename = "Composite")]
        composite: String,
        #[tabled(rename = "Structural")]
        structural: String,
        #[tabled(rename = "Traffic")]
        traffic: String,
        #[tabled(rename = "Price")]
        price: String,
        #[tabled(rename = "Region")]
        region: String,
    }

    let score = |v: f64| format!("{:.2}", v);
    let rows: Vec<SiteRow> = result
        .ranked
        .iter()
        .map(|site| {
            let b = &site.breakdown;
            SiteRow {
                rank: site.rank,
                id: site.site_id.0,
                name: site.name.clone(),
                final_score: score(b.final_score),
                vector: score(b.vector_normalized),
                composite: score(b.composite_score),
                structural: if b.structural_normalized > 0.0 {
                    score(b.structural_normalized)
                } else {
                    "-".to_string()
                },
                traffic: score(b.traffic_score),
                price: score(b.price_score),
                region: score(b.region_score),
            }
        })
        .collect();
    output.table(rows);

    let w = result.weights;
    output.kv(
        "Weights",
        format!("traffic {:.2}, price {:.2}, region {:.2}", w.traffic, w.price, w.region),
    );
    output.kv("Map center", format!("{:.5}, {:.5}", result.center.lon, result.center.lat));
}

fn show_route(result: &SelectionResult, output: &OutputWriter) {
    if result.clusters.len() < 2 && result.visit_order.len() < 2 {
        return;
    }

    output.section("Route");
    let join = |ids: &[SiteId]| ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(" → ");
    output.kv("Visit order", join(&result.visit_order));
    for &position in &result.cluster_order {
        if let Some(cluster) = result.clusters.get(position) {
            output.kv(format!("Cluster {}", cluster.id), join(&cluster.members));
        }
    }
}

fn show_narration(result: &SelectionResult, output: &OutputWriter) {
    match &result.narration {
        Narration::Skipped => {}
        Narration::Failed { reason } => output.warning(format!("Narration failed: {}", reason)),
        Narration::Complete { narrative } => {
            output.section("Recommendation");
            if !narrative.summary.is_empty() {
                output.info(&narrative.summary);
            }
            if !narrative.recommendations.is_empty() {
                output.kv("Order", &narrative.recommendations);
            }
            for position in 0..result.ranked.len() {
                let Some(site) = narrative.site(position) else {
                    continue;
                };
                output.kv(format!("{}. {}", position + 1, site.name), &site.reason);
                for advantage in &site.advantages {
                    output.info(format!("  + {}", advantage));
                }
                for risk in &site.risks {
                    output.info(format!("  - {}", risk));
                }
            }
        }
    }
}
