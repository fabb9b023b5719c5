use tracing::info;

use super::{Bot, RunRequest};
use crate::config::Params;
use crate::driver::Connector;
use crate::engine::{Engine, Reporter, RunOutcome};
use crate::Result;

pub(super) async fn run<C: Connector>(bot: &Bot<C>, request: &RunRequest) -> RunOutcome {
    let mut reporter = Reporter::new();
    let params = match bot.params(request) {
        Ok(params) => params,
        Err(e) => {
            reporter.fail(e.to_string());
            return reporter.finish();
        }
    };

    let mut engine = match bot.establish(reporter).await {
        Ok(engine) => engine,
        Err(outcome) => return outcome,
    };
    let result = declare(bot, &mut engine, &params, request.submit).await;
    engine.finish(result).await
}

async fn declare<C: Connector>(
    bot: &Bot<C>,
    engine: &mut Engine<C::Driver>,
    params: &Params,
    submit: bool,
) -> Result<()> {
    bot.login(engine, params).await?;
    engine.run_phase(&bot.config, "declaration", params).await?;

    if submit {
        engine.run_phase(&bot.config, "submission", params).await?;
        engine.mark_submitted();
    } else {
        info!("submission disabled, leaving the declaration form unsent");
        engine.report("Presentación omitida: el envío no está habilitado.");
    }
    Ok(())
}
