use super::types::{TaskResult, UsageTotals};

/// Sum usage across a batch. Mode-independent and side-effect free.
pub fn aggregate_usage(results: &[TaskResult]) -> UsageTotals {
    results.iter().fold(UsageTotals::default(), |mut totals, result| {
        let usage = &result.usage;
        totals.input += usage.input_tokens;
        totals.output += usage.output_tokens;
        totals.cache_read += usage.cache_read_tokens;
        totals.cache_write += usage.cache_write_tokens;
        totals.cost_usd += usage.cost_usd;
        totals.turns += usage.turns;
        totals
    })
}
