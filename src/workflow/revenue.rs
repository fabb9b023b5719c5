use std::path::{Path, PathBuf};
use taxbot_sheets::{Aggregate, SheetError};
use tracing::{info, warn};

use super::{Bot, RunRequest};
use crate::config::Params;
use crate::driver::Connector;
use crate::engine::{Engine, Reporter, RunOutcome};
use crate::{Error, Result};

pub(super) async fn run<C: Connector>(bot: &Bot<C>, request: &RunRequest) -> RunOutcome {
    let mut reporter = Reporter::new();
    let dir = &bot.config.downloads.dir;
    let shown = std::path::absolute(dir).unwrap_or_else(|_| dir.clone());
    reporter.push(format!("Los archivos se guardarán en: {}", shown.display()));

    let params = match bot.params(request) {
        Ok(params) => params,
        Err(e) => {
            reporter.fail(e.to_string());
            return reporter.finish();
        }
    };
    if let Err(e) = std::fs::create_dir_all(dir) {
        reporter.fail(Error::from(e).to_string());
        return reporter.finish();
    }

    let mut engine = match bot.establish(reporter).await {
        Ok(engine) => engine,
        Err(outcome) => return outcome,
    };
    let result = declare(bot, &mut engine, params, request).await;
    engine.finish(result).await
}

async fn declare<C: Connector>(
    bot: &Bot<C>,
    engine: &mut Engine<C::Driver>,
    mut params: Params,
    request: &RunRequest,
) -> Result<()> {
    bot.login(engine, &params).await?;
    engine.report("¡Conexión exitosa!");

    let file = acquire(bot, engine, &params, request.spreadsheet.as_deref()).await?;
    match decide((bot.ingest)(&file))? {
        Some(totals) => {
            engine.report(format!(
                "Datos a declarar recuperados: Retenciones={}, Percepciones={}",
                format_amount(totals.retencion()),
                format_amount(totals.percepcion())
            ));
            params.insert("percepcion", format!("{:.2}", totals.percepcion()));
            params.insert("retencion", format!("{:.2}", totals.retencion()));
            engine.run_phase(&bot.config, "declaration", &params).await?;
            if request.submit {
                engine.run_phase(&bot.config, "submission", &params).await?;
                engine.mark_submitted();
            } else {
                info!("submission disabled, leaving the activity row unsaved");
                engine.report("Guardado omitido: el envío no está habilitado.");
            }
        }
        None => engine.report("No se encontraron datos para procesar."),
    }

    engine.report("PROCESO COMPLETO DEL BOT FINALIZADO.");
    Ok(())
}

/// The spreadsheet to ingest: the caller's, or a fresh download.
async fn acquire<C: Connector>(
    bot: &Bot<C>,
    engine: &mut Engine<C::Driver>,
    params: &Params,
    spreadsheet: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(path) = spreadsheet {
        engine.report(format!("Usando archivo existente: {}", path.display()));
        return Ok(path.to_path_buf());
    }

    engine.run_phase(&bot.config, "acquisition", params).await?;
    let saved = engine
        .last_download()
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            Error::ActionFailed("acquisition phase finished without a download".into())
        })?;
    engine.report(format!(
        "¡Archivo descargado y renombrado!: {}",
        saved.display()
    ));
    Ok(saved)
}

/// Join point between acquisition and declaration. `None` means there is
/// nothing to declare and the declaration phase is skipped.
pub(super) fn decide(ingested: taxbot_sheets::Result<Aggregate>) -> Result<Option<Aggregate>> {
    match ingested {
        Ok(totals) if totals.is_empty() => Ok(None),
        Ok(totals) => {
            for (category, total) in totals.declared() {
                info!("total {}: {}", category.label(), format_amount(total));
            }
            Ok(Some(totals))
        }
        Err(SheetError::NoData) => Ok(None),
        Err(e) => {
            warn!("spreadsheet unusable: {}", e);
            Err(e.into())
        }
    }
}

/// Two decimals with `,` thousands separators: `1234567.5` is `1,234,567.50`.
pub fn format_amount(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, fraction)
}
