use owo_colors::OwoColorize;

use super::{Automaton, StateId};

impl Automaton {
    /// Renders the live states as a table with one row per state and one column per symbol.
    /// Accepting states are marked with `+`, rejecting ones with `-`.
    pub fn transition_table(&self) -> String {
        self.build_transition_table(|id| {
            let state = &self.states[id.index()];
            let mark = match (state.accepting, state.rejecting) {
                (true, true) => "!",
                (true, false) => "+",
                (false, true) => "-",
                (false, false) => "",
            };
            let name = format!("{id:?}{mark}");
            if id == self.root {
                name.bold().to_string()
            } else {
                name
            }
        })
    }

    fn build_transition_table<SD>(&self, state_decorator: SD) -> String
    where
        SD: Fn(StateId) -> String,
    {
        let mut builder = tabled::builder::Builder::default();
        builder.push_record(
            std::iter::once("State".to_string())
                .chain((0..self.alphabet_size).map(|s| s.to_string())),
        );
        for id in self.reachable() {
            let state = &self.states[id.index()];
            let mut row = vec![state_decorator(id)];
            for symbol in 0..self.alphabet_size {
                match state.child(symbol) {
                    Some(target) => row.push(format!("{target:?} ({})", state.edge_count(symbol))),
                    None => row.push("-".to_string()),
                }
            }
            builder.push_record(row);
        }

        builder
            .build()
            .with(tabled::settings::Style::rounded())
            .to_string()
    }
}
