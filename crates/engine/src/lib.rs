pub mod backtest;
pub mod metrics;
pub mod validate;

pub use backtest::{
    run_backtest, BacktestRequest, BacktestResult, BacktestSummary, CostModel, RiskModel,
    TradeRecord, EXIT_HORIZON,
};
pub use metrics::{
    compute_metrics, equity_curve, period_breakdown, EquityPoint, PerformanceMetrics, Period,
    PeriodStats, TradePoint,
};
pub use validate::{validate_request, MIN_CANDLES};
