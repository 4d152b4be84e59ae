use dfa_inference::{prelude::*, search};
use itertools::Itertools;

fn training() -> (SymbolTable, Vec<Sample>) {
    let mut symbols = SymbolTable::new();
    let mut samples = ["aaab", "aaaaab", "aaabc"]
        .into_iter()
        .map(|w| Sample::accept(symbols.intern_chars(w)))
        .collect_vec();
    samples.push(Sample::reject(symbols.intern_chars("aab")));
    samples.push(Sample::reject(symbols.intern_chars("ba")));
    (symbols, samples)
}

fn words(alphabet: u32, max_length: usize) -> Vec<Vec<SymbolId>> {
    (0..=max_length)
        .flat_map(|length| {
            std::iter::repeat(0..alphabet)
                .take(length)
                .multi_cartesian_product()
        })
        .collect()
}

#[test]
fn prefix_tree_has_one_state_per_prefix() {
    let mut symbols = SymbolTable::new();
    let samples = ["aaab", "aaaaab", "aaabc"]
        .into_iter()
        .map(|w| Sample::accept(symbols.intern_chars(w)))
        .collect_vec();
    let pta = Automaton::build(symbols.len(), &samples).unwrap();
    assert_eq!(pta.size(), 9);
    let accepting = pta
        .reachable()
        .into_iter()
        .filter(|&id| pta.state(id).is_accepting())
        .count();
    assert_eq!(accepting, 3);
    assert!(!pta.recognize(&symbols.intern_chars("aaa")));

    let mut mdl = Mdl::default();
    let score = mdl.score_automaton(&mut pta.clone());
    assert!(score.is_finite() && score > 0.0);
}

#[test_log::test]
fn every_strategy_stays_consistent() {
    let (symbols, samples) = training();
    let pta = Automaton::build(symbols.len(), &samples).unwrap();
    for name in [
        "mdl",
        "states",
        "edges",
        "agreement",
        "chi-square",
        "fisher",
        "normal",
    ] {
        let mut strategy = name.parse::<StrategyKind>().unwrap();
        let learned = fold(
            pta.clone(),
            &mut strategy,
            &mut Greedy,
            &SearchConfig::default(),
        )
        .unwrap();
        assert_eq!(learned.check_consistency(&samples), Ok(()), "{name}");
        assert!(learned.size() <= pta.size(), "{name}");
    }
}

#[test]
fn minimization_preserves_the_language() {
    let (symbols, samples) = training();
    let pta = Automaton::build(symbols.len(), &samples).unwrap();
    let learned = fold(
        pta,
        &mut StateCount,
        &mut Greedy,
        &SearchConfig::default().with_minimize(false),
    )
    .unwrap();
    let minimal = learned.minimize();
    assert!(minimal.size() <= learned.size());
    for word in words(symbols.len() as u32, 6) {
        assert_eq!(learned.recognize(&word), minimal.recognize(&word), "{word:?}");
    }
    assert_eq!(minimal.minimize().size(), minimal.size());
}

#[test]
fn text_round_trip() {
    let (symbols, samples) = training();
    let pta = Automaton::build(symbols.len(), &samples).unwrap();
    let learned = fold(
        pta,
        &mut LabelAgreement::default(),
        &mut Greedy,
        &SearchConfig::default(),
    )
    .unwrap();
    let text = learned.to_text(TextMode::All);
    let parsed: Automaton = text.parse().unwrap();
    assert_eq!(parsed.size(), learned.size());
    assert_eq!(parsed.to_text(TextMode::All), text);
    for word in words(symbols.len() as u32, 5) {
        assert_eq!(parsed.classify(&word), learned.classify(&word));
    }
}

#[cfg(feature = "random")]
#[test]
fn decisions_replay_a_random_run() {
    let (symbols, samples) = training();
    let pta = Automaton::build(symbols.len(), &samples).unwrap();
    let config = SearchConfig::default();
    for seed in [3, 11, 42] {
        let mut strategy = EdgeCount;
        let random = search::run(pta.clone(), &mut strategy, &mut Random::new(seed), &config)
            .unwrap();
        let replayed = search::run(
            pta.clone(),
            &mut strategy,
            &mut Replay::new(random.decisions.clone()),
            &config,
        )
        .unwrap();
        assert_eq!(
            random.automaton.to_text(TextMode::All),
            replayed.automaton.to_text(TextMode::All)
        );
        assert_eq!(random.score, replayed.score);
        assert_eq!(random.automaton.check_consistency(&samples), Ok(()));
    }
}

#[test]
fn best_of_many_is_no_worse_than_greedy() {
    let (symbols, samples) = training();
    let pta = Automaton::build(symbols.len(), &samples).unwrap();
    let mut strategy = Mdl::default();
    let config = SearchConfig::default();
    let greedy = search::run(pta.clone(), &mut strategy, &mut Greedy, &config).unwrap();
    let best = fold_best(
        &pta,
        &mut strategy,
        [Replay::new([]), Replay::new([1]), Replay::new([0, 2])],
        &config,
    )
    .unwrap();
    assert!(best.score <= greedy.score);
    assert_eq!(best.automaton.check_consistency(&samples), Ok(()));
}
