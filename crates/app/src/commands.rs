use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use sieve_core::TaxYear;
use sieve_import::tools::{default_output_path, tax_year_cutoff};
use sieve_import::{
    merge_award_files, merge_price_files, merge_spin_off_files, merge_transaction_files,
    postprocess_file, prepare_directory, Config, MergeSummary, PostprocessOptions,
    PostprocessSummary, PrepareSummary, TransactionMergeOptions,
};
use tracing::debug;

use crate::{Cli, Commands, FixArgs};

pub fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let json = cli.json;

    match cli.command {
        Commands::MergeTransactions {
            files,
            output,
            keep_unmatched_transfers,
            no_transfer_filter,
        } => {
            let options = merge_options(&config, keep_unmatched_transfers, no_transfer_filter);
            let summary = merge_transaction_files(&files, &output, &options)
                .with_context(|| format!("Failed to merge transactions into {}", output.display()))?;
            report(json, &summary, |s| print_merge("transactions", s))
        }
        Commands::MergeAwards { files, output } => {
            let summary = merge_award_files(&files, &output)
                .with_context(|| format!("Failed to merge awards into {}", output.display()))?;
            report(json, &summary, |s| print_merge("awards", s))
        }
        Commands::MergePrices { files, output } => {
            let summary = merge_price_files(&files, &output)
                .with_context(|| format!("Failed to merge prices into {}", output.display()))?;
            report(json, &summary, |s| print_merge("prices", s))
        }
        Commands::MergeSpinOffs { files, output } => {
            let summary = merge_spin_off_files(&files, &output)
                .with_context(|| format!("Failed to merge spin-offs into {}", output.display()))?;
            report(json, &summary, |s| print_merge("spin-offs", s))
        }
        Commands::Postprocess {
            file,
            output,
            log,
            fixes,
            no_fix_symbols,
            securities_only,
        } => {
            let mut options = postprocess_options(&config, &fixes)?;
            options.fix_symbols = !no_fix_symbols;
            options.securities_only |= securities_only;
            let output = output.unwrap_or_else(|| default_output_path(&file));
            let summary = postprocess_file(
                &file,
                &output,
                fixes.mapping.as_deref(),
                options,
                log.as_deref(),
            )
            .with_context(|| format!("Failed to postprocess {}", file.display()))?;
            report(json, &summary, print_postprocess)
        }
        Commands::Prepare {
            transactions,
            awards,
            output,
            fixes,
        } => {
            let options = postprocess_options(&config, &fixes)?;
            let merge = merge_options(&config, false, false);
            let summary = prepare_directory(
                &transactions,
                &awards,
                &output,
                fixes.mapping.as_deref(),
                &merge,
                options,
            )
            .with_context(|| format!("Failed to prepare {}", output.display()))?;
            report(json, &summary, print_prepare)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            debug!(config = %path.display(), "loading config");
            Config::load(path).with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => Ok(Config::default()),
    }
}

fn merge_options(config: &Config, keep_unmatched: bool, no_filter: bool) -> TransactionMergeOptions {
    TransactionMergeOptions {
        filter_transfers: config.transfers.enabled && !no_filter,
        keep_unmatched: config.transfers.keep_unmatched || keep_unmatched,
    }
}

fn postprocess_options(config: &Config, fixes: &FixArgs) -> Result<PostprocessOptions> {
    let mut options = config.postprocess_options();
    options.fix_rounding = fixes.fix_rounding;
    if let Some(year) = fixes.tax_year {
        let cutoff = tax_year_cutoff(year).with_context(|| format!("Invalid tax year {year}"))?;
        debug!(tax_year = %TaxYear::new(year), %cutoff, "dropping later rows");
        options.cutoff = Some(cutoff);
    }
    Ok(options)
}

fn report<T: Serialize>(json: bool, summary: &T, print: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        print(summary);
    }
    Ok(())
}

// ── Text summaries ───────────────────────────────────────────────────────────

fn print_merge(kind: &str, summary: &MergeSummary) {
    println!("✓ Merged {} {kind} file(s) into {}", summary.files.len(), summary.output);
    for file in &summary.files {
        println!("  {}: {} records", file.file, file.records);
    }
    println!(
        "  Read {}, duplicates removed {}",
        summary.total_input, summary.duplicates
    );
    for replacement in &summary.replacements {
        println!("  Replaced {replacement}");
    }
    if let Some(transfers) = &summary.transfers {
        println!(
            "  Transfers removed {} ({} journaled share pair(s), {} journal pair(s))",
            transfers.removed(),
            transfers.journaled_pairs,
            transfers.journal_pairs
        );
        if transfers.unmatched_kept > 0 {
            println!("  Unmatched transfers kept {}", transfers.unmatched_kept);
        }
    }
    match summary.date_range {
        Some(range) => println!("  Wrote {} ({range})", summary.written),
        None => println!("  Wrote {}", summary.written),
    }
}

fn print_postprocess(summary: &PostprocessSummary) {
    let stats = &summary.stats;
    println!("✓ Processed {} -> {}", summary.input, summary.output);
    println!("  Rows read {}, written {}", stats.total_rows, stats.rows_written());
    if stats.filtered_rows > 0 {
        println!("  Dropped after tax year end {}", stats.filtered_rows);
    }
    println!(
        "  Missing symbols {} (mapped {}, generated {})",
        stats.missing_symbols, stats.mapped, stats.generated
    );
    if stats.rounding_fixed > 0 {
        println!("  Rounding fixed {}", stats.rounding_fixed);
    }
    for collision in &summary.collisions {
        println!(
            "  ! Symbol {} used for both '{}' and '{}'",
            collision.symbol, collision.first, collision.other
        );
    }
    if let Some(log) = &summary.log {
        println!("  {} change(s) logged to {log}", summary.changes);
    }
}

fn print_prepare(summary: &PrepareSummary) {
    print_merge("transactions", &summary.transactions);
    if let Some(awards) = &summary.awards {
        print_merge("awards", awards);
    }
    print_postprocess(&summary.postprocess);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clap::Parser;
    use sieve_import::tools::{PREPARED_AWARDS, PREPARED_TRANSACTIONS};
    use std::fs;

    const HEADER: &str = "Date,Action,Symbol,Description,Quantity,Price,Fees & Comm,Amount\n";

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("sieve").chain(args.iter().copied())).unwrap()
    }

    // ── Option layering ──

    #[test]
    fn flags_override_config() {
        let mut config = Config::default();
        config.transfers.keep_unmatched = false;
        let opts = merge_options(&config, true, false);
        assert!(opts.keep_unmatched);
        assert!(opts.filter_transfers);
        assert!(!merge_options(&config, false, true).filter_transfers);

        config.transfers.enabled = false;
        assert!(!merge_options(&config, false, false).filter_transfers);
    }

    #[test]
    fn tax_year_sets_cutoff() {
        let fixes = FixArgs {
            tax_year: Some(2024),
            fix_rounding: true,
            ..FixArgs::default()
        };
        let opts = postprocess_options(&Config::default(), &fixes).unwrap();
        assert!(opts.fix_rounding);
        assert_eq!(opts.cutoff, NaiveDate::from_ymd_opt(2025, 4, 5));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("none.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load config"));
    }

    // ── End to end ──

    #[test]
    fn postprocess_command_uses_default_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tx.csv");
        fs::write(
            &input,
            format!("{HEADER}05/30/2025,Buy,,VANGUARD FTSE ALL WORLD,1,$10.00,,-$10.00\n"),
        )
        .unwrap();
        let cli = parse(&["postprocess", input.to_str().unwrap()]);
        run(cli).unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("tx_processed.csv")).unwrap(),
            format!("{HEADER}05/30/2025,Buy,VFAW,VANGUARD FTSE ALL WORLD,1,$10.00,,-$10.00\n")
        );
    }

    #[test]
    fn prepare_command_writes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tx.csv");
        fs::write(
            &input,
            format!(
                "{HEADER}05/30/2025,Qual Div Reinvest,VWRL,VANGUARD FTSE ALL WORLD,0.571,$54.34,,-$31.04\n"
            ),
        )
        .unwrap();
        let out_dir = dir.path().join("prepared");
        let cli = parse(&[
            "prepare",
            "--transactions",
            input.to_str().unwrap(),
            "-o",
            out_dir.to_str().unwrap(),
            "--fix-rounding",
            "--tax-year",
            "2025",
        ]);
        run(cli).unwrap();

        assert!(!out_dir.join(PREPARED_AWARDS).exists());
        assert_eq!(
            fs::read_to_string(out_dir.join(PREPARED_TRANSACTIONS)).unwrap(),
            format!(
                "{HEADER}05/30/2025,Qual Div Reinvest,VWRL,VANGUARD FTSE ALL WORLD,0.571,$54.34,,-$31.03\n"
            )
        );
    }

    #[test]
    fn merge_command_reports_context() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.csv");
        let missing = dir.path().join("missing.csv");
        let cli = parse(&[
            "merge-transactions",
            missing.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ]);
        let err = run(cli).unwrap_err();
        assert!(format!("{err:#}").starts_with("Failed to merge transactions into"));
        assert!(!out.exists());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = parse(&["merge-awards", "a.csv", "-o", "out.csv", "--config", "sieve.toml", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.config.as_deref(), Some(Path::new("sieve.toml")));
    }
}
