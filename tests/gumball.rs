//! End-to-end: the gumball dispenser, from text to a running machine.

use plantchart::syntax::PragmaKind;
use plantchart::{
    compile, BindingsBuilder, Config, DispatchOutcome, Machine, Reactor, SharedMachine,
    Statechart,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const GUMBALL: &str = r#"@startuml Gumball
skinparam monochrome true
'[brief] A gumball dispenser.
'[param] int count
'[init] count = 1;
'[header] #include <cstdio>

[*] --> NoQuarter
NoQuarter --> HasQuarter : insert quarter
HasQuarter --> NoQuarter : eject quarter / refund()
HasQuarter --> GumballSold : turn crank / count -= 1
GumballSold --> NoQuarter : [count > 0]
GumballSold --> OutOfGumballs : [count == 0]

GumballSold : entry / dispense()
OutOfGumballs : comment / refill needed
note right of OutOfGumballs : terminal
@enduml
"#;

#[derive(Debug, Default)]
struct Dispenser {
    count: u32,
    log: Vec<String>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn builder() -> BindingsBuilder<Dispenser> {
    BindingsBuilder::new()
        .effect("refund()", |d: &mut Dispenser| d.log.push("refund".into()))
        .effect("count -= 1", |d: &mut Dispenser| {
            d.count -= 1;
            d.log.push(format!("count={}", d.count));
        })
        .effect("dispense()", |d: &mut Dispenser| d.log.push("dispense".into()))
        .guard("count > 0", |d: &Dispenser| d.count > 0)
        .guard("count == 0", |d: &Dispenser| d.count == 0)
}

fn machine(count: u32) -> Machine<Dispenser> {
    init_tracing();
    let chart = compile(GUMBALL, &Config::default()).unwrap();
    let bindings = builder().build(&chart).unwrap();
    let context = Dispenser {
        count,
        ..Default::default()
    };
    Machine::new(Arc::new(bindings), context).unwrap()
}

#[test]
fn test_model() {
    let chart = compile(GUMBALL, &Config::default()).unwrap();
    assert!(chart.warnings().is_empty());
    assert_eq!(chart.name, "Gumball");
    let names: Vec<_> = chart.states.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["NoQuarter", "HasQuarter", "GumballSold", "OutOfGumballs"]
    );
    assert_eq!(chart.initial.as_ref().unwrap().as_str(), "NoQuarter");
    assert_eq!(
        chart.state("OutOfGumballs").unwrap().comment.as_deref(),
        Some("refill needed")
    );

    let pragmas = chart.pragmas.grouped();
    assert_eq!(pragmas[&PragmaKind::Init], vec!["count = 1;"]);
    assert_eq!(pragmas[&PragmaKind::Param], vec!["int count"]);
    assert_eq!(pragmas[&PragmaKind::Brief], vec!["A gumball dispenser."]);

    let keys: Vec<_> = chart.events().iter().map(|e| e.camel_case()).collect();
    assert_eq!(keys, vec!["insertQuarter", "ejectQuarter", "turnCrank"]);
}

#[test]
fn test_trace_with_one_gumball() {
    let mut m = machine(1);
    assert!(m.is_in("NoQuarter"));

    assert!(m.fire("insert quarter").unwrap().is_transitioned());
    assert!(m.is_in("HasQuarter"));

    assert!(m.fire("turn crank").unwrap().is_transitioned());
    assert!(m.is_in("GumballSold"));
    assert_eq!(m.context().count, 0);
    assert_eq!(m.context().log, vec!["count=0", "dispense"]);

    // Nothing advances until the outbound table is dispatched.
    assert!(m.is_in("GumballSold"));
    assert!(m.complete().is_transitioned());
    assert!(m.is_in("OutOfGumballs"));
}

#[test]
fn test_trace_with_two_gumballs() {
    let mut m = machine(2);
    m.fire("insert quarter").unwrap();
    m.fire("turn crank").unwrap();
    m.complete();
    assert!(m.is_in("NoQuarter"));
    assert_eq!(m.context().count, 1);
}

#[test]
fn test_each_guarded_table_separately() {
    let mut m = machine(1);
    m.fire("insert quarter").unwrap();
    m.fire("turn crank").unwrap();

    let bindings = Arc::clone(m.bindings());
    let sold = bindings.state_id("GumballSold").unwrap();
    let outbound = bindings.completions(sold);
    assert_eq!(outbound.len(), 2);

    // [count > 0] is refused: no handler, no state change.
    assert!(matches!(
        m.dispatch(&outbound[0]),
        DispatchOutcome::Rejected { .. }
    ));
    assert!(m.is_in("GumballSold"));

    assert!(m.dispatch(&outbound[1]).is_transitioned());
    assert!(m.is_in("OutOfGumballs"));
}

#[test]
fn test_ignored_events() {
    let mut m = machine(1);
    assert_eq!(m.fire("eject quarter").unwrap(), DispatchOutcome::Ignored);
    assert_eq!(m.fire("turn crank").unwrap(), DispatchOutcome::Ignored);
    assert!(m.is_in("NoQuarter"));
    assert!(m.context().log.is_empty());

    m.fire("insert quarter").unwrap();
    m.fire("eject quarter").unwrap();
    assert!(m.is_in("NoQuarter"));
    assert_eq!(m.context().log, vec!["refund"]);
}

#[test]
fn test_self_driving_dispenser() {
    // The entry handler asks for the outbound transitions itself.
    let chart = compile(GUMBALL, &Config::default()).unwrap();
    let bindings = builder()
        .action(
            "dispense()",
            |d: &mut Dispenser, r: &mut Reactor<'_, Dispenser>| {
                d.log.push("dispense".into());
                let bindings = r.bindings();
                let sold = r.current_state();
                let ready = bindings
                    .completions(sold)
                    .iter()
                    .find(|t| {
                        t.get(sold)
                            .and_then(|row| row.guard.as_ref())
                            .map_or(true, |g| g(&*d))
                    });
                if let Some(table) = ready {
                    r.react(table);
                }
            },
        )
        .build(&chart)
        .unwrap();
    let context = Dispenser {
        count: 1,
        ..Default::default()
    };
    let mut m = Machine::new(Arc::new(bindings), context).unwrap();

    m.fire("insert quarter").unwrap();
    let outcome = m.fire("turn crank").unwrap();
    assert!(m.is_in("OutOfGumballs"));
    assert_eq!(
        outcome,
        DispatchOutcome::Transitioned {
            from: m.bindings().state_id("HasQuarter").unwrap(),
            to: m.current_state(),
        }
    );
}

#[test]
fn test_shared_across_threads() {
    let shared = SharedMachine::new(machine(100));
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            std::thread::spawn(move || {
                for _ in 0..5 {
                    shared.with(|m| {
                        m.fire("insert quarter").unwrap();
                        m.fire("turn crank").unwrap();
                        m.complete();
                    });
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(shared.with(|m| m.context().count), 80);
    assert!(shared.with(|m| m.is_in("NoQuarter")));
}

#[test]
fn test_json_export() {
    let chart = compile(GUMBALL, &Config::default()).unwrap();
    let json = chart.to_json().unwrap();
    assert_eq!(json["name"], "Gumball");
    assert_eq!(json["transitions"][3]["action"]["text"], "count -= 1");
    assert_eq!(json["transitions"][3]["action"]["form"], "inline");
    assert_eq!(json["pragmas"][0]["kind"], "brief");

    let back = Statechart::from_json(&json).unwrap();
    assert_eq!(back.checksum().unwrap(), chart.checksum().unwrap());

    // Layout changes do not change the checksum.
    let reformatted = GUMBALL.replace("[*] --> NoQuarter", "[*]   -->   NoQuarter");
    let other = compile(&reformatted, &Config::default()).unwrap();
    assert_eq!(other.checksum().unwrap(), chart.checksum().unwrap());
}
