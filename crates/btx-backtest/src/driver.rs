use btx_portfolio::{EnterError, ExitError, MarkMap, Portfolio};
use btx_priceseries::PriceSeries;
use btx_sandbox::{BarView, CompiledStrategy, OrderIntent, SandboxError};
use chrono::NaiveDate;
use std::fmt;

#[derive(Debug)]
pub enum DriverError {
    Sandbox(SandboxError),
    Enter(EnterError),
    Exit(ExitError),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Sandbox(e) => write!(f, "strategy error: {e}"),
            DriverError::Enter(e) => write!(f, "order rejected: {e}"),
            DriverError::Exit(e) => write!(f, "order rejected: {e}"),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<SandboxError> for DriverError {
    fn from(e: SandboxError) -> Self {
        DriverError::Sandbox(e)
    }
}

fn bar_view(series: &PriceSeries, i: usize) -> BarView {
    let bar = series.candle(i);
    BarView { index: i as i64, open: bar.open, high: bar.high, low: bar.low, close: bar.close }
}

/// Applies every order intent a hook call produced, in order, against the
/// bar's close. Stops (and surfaces the rejection) at the first one a
/// [`Portfolio`] admission check or validity check refuses — matching the
/// upstream behavior of a rejected order raising and aborting the run for
/// that symbol.
fn apply_intents(
    portfolio: &mut Portfolio,
    symbol: &str,
    intents: Vec<OrderIntent>,
    bar_index: usize,
    date: NaiveDate,
    raw_price: f64,
    marks: &mut MarkMap,
) -> Result<(), DriverError> {
    for intent in intents {
        match intent {
            OrderIntent::EnterLong { qty } => {
                portfolio
                    .enter_long(symbol, qty, raw_price, bar_index, date, marks)
                    .map_err(DriverError::Enter)?;
            }
            OrderIntent::EnterShort { qty } => {
                portfolio
                    .enter_short(symbol, qty, raw_price, bar_index, date, marks)
                    .map_err(DriverError::Enter)?;
            }
            OrderIntent::Exit { qty } => {
                portfolio.exit(symbol, qty, raw_price, bar_index, date, marks).map_err(DriverError::Exit)?;
            }
        }
    }
    Ok(())
}

/// Drives a single strategy over `[start, end]` against one symbol's bars,
/// calling `start` once, `update` once per bar, and `end` once, applying any
/// orders the strategy requests after each call. A no-op when the resolved
/// start index is after the resolved end index.
pub fn run(
    strategy: &mut CompiledStrategy,
    portfolio: &mut Portfolio,
    series: &PriceSeries,
    symbol: &str,
    marks: &mut MarkMap,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), DriverError> {
    let start_iloc = series.to_iloc_date(start);
    let end_iloc = series.to_iloc_date(end);
    if start_iloc > end_iloc {
        return Ok(());
    }

    let start_bar = bar_view(series, start_iloc);
    marks.insert(symbol.to_string(), start_bar.close);
    let intents = strategy.start(start_bar)?;
    apply_intents(portfolio, symbol, intents, start_iloc, series.date(start_iloc), start_bar.close, marks)?;

    for i in start_iloc..=end_iloc {
        let bar = bar_view(series, i);
        marks.insert(symbol.to_string(), bar.close);
        let intents = strategy.update(bar)?;
        apply_intents(portfolio, symbol, intents, i, series.date(i), bar.close, marks)?;
    }

    let end_bar = bar_view(series, end_iloc);
    marks.insert(symbol.to_string(), end_bar.close);
    let intents = strategy.end(end_bar)?;
    apply_intents(portfolio, symbol, intents, end_iloc, series.date(end_iloc), end_bar.close, marks)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use btx_portfolio::PortfolioConfig;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series() -> PriceSeries {
        use btx_priceseries::Bar;
        PriceSeries::from_bars(
            "X",
            vec![
                Bar { date: d(2024, 1, 1), open: 10.0, high: 10.0, low: 10.0, close: 10.0 },
                Bar { date: d(2024, 1, 2), open: 11.0, high: 11.0, low: 11.0, close: 11.0 },
                Bar { date: d(2024, 1, 3), open: 12.0, high: 12.0, low: 12.0, close: 12.0 },
            ],
        )
    }

    #[test]
    fn buy_and_hold_strategy_accumulates_one_position() {
        let code = r#"
            let bought = false;
            fn update(bar) {
                if !this.bought {
                    buy(10.0);
                    this.bought = true;
                }
            }
        "#;
        let mut strategy = CompiledStrategy::compile(code).unwrap();
        let mut portfolio = Portfolio::new(1000.0, PortfolioConfig::default());
        let mut marks = MarkMap::new();
        let s = series();
        run(&mut strategy, &mut portfolio, &s, "X", &mut marks, d(2024, 1, 1), d(2024, 1, 3)).unwrap();
        assert_eq!(portfolio.positions["X"].quantity, 10.0);
        assert_eq!(portfolio.cash, 900.0);
    }

    #[test]
    fn start_date_after_end_date_is_a_no_op() {
        let code = "fn update(bar) {}";
        let mut strategy = CompiledStrategy::compile(code).unwrap();
        let mut portfolio = Portfolio::new(1000.0, PortfolioConfig::default());
        let mut marks = MarkMap::new();
        let s = series();
        run(&mut strategy, &mut portfolio, &s, "X", &mut marks, d(2024, 1, 3), d(2024, 1, 1)).unwrap();
        assert_eq!(portfolio.cash, 1000.0);
    }
}
