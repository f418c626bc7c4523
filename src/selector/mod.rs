use crate::models::FinancialTable;

/// Income-statement lines the financials chart can show, in display order.
pub const CANDIDATE_METRICS: [&str; 4] =
    ["Total Revenue", "Gross Profit", "Operating Income", "Net Income"];

/// Candidates present as columns of `table`, in candidate order.
///
/// An empty result is the ordinary "no financials chart" case: the provider
/// may simply not report these lines for the company.
pub fn select_available_metrics(table: &FinancialTable, candidates: &[&str]) -> Vec<String> {
    candidates
        .iter()
        .filter(|name| table.has_column(name))
        .map(|name| name.to_string())
        .collect()
}
