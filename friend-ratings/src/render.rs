use crate::traits::RenderSink;
use crate::types::RankingEntry;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// bangumi.tv, bgm.tv and chii.in serve the same subjects.
    pub site_host: String,
    /// Hide subjects with fewer raters; the remaining rows are renumbered.
    pub min_raters: Option<usize>,
    pub top: Option<usize>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            site_host: "bangumi.tv".to_string(),
            min_raters: None,
            top: None,
        }
    }
}

pub fn format_entries(entries: &[RankingEntry], options: &RenderOptions) -> Vec<String> {
    let min_raters = options.min_raters.unwrap_or(0);
    let top = options.top.unwrap_or(usize::MAX);

    entries
        .iter()
        .filter(|entry| entry.num_rates >= min_raters)
        .take(top)
        .enumerate()
        .map(|(index, entry)| {
            format!(
                "{} - {} - average: {:.2} - raters: {} - https://{}/subject/{}",
                index + 1,
                entry.subject_name,
                entry.average_rate,
                entry.num_rates,
                options.site_host,
                entry.subject_id
            )
        })
        .collect()
}

/// Prints the leaderboard to stdout.
pub struct ConsoleRenderer {
    options: RenderOptions,
}

impl ConsoleRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }
}

impl RenderSink for ConsoleRenderer {
    fn render(&self, entries: &[RankingEntry]) {
        let lines = format_entries(entries, &self.options);
        println!("==== Friend ratings leaderboard ({} subjects) ====", lines.len());
        for line in lines {
            println!("{}", line);
        }
    }
}
