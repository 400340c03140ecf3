//! End-to-end rendering tests through the public API.

use brine::{BrineError, RenderOptions, Value, render_source};
use serde_json::json;
use std::collections::HashMap;

fn params(json: Value) -> HashMap<String, Value> {
    json.as_object()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .collect()
}

fn render(source: &str, data: Value) -> String {
    render_source(source, &params(data), &RenderOptions::default()).unwrap()
}

#[test]
fn renders_plain_text_unchanged() {
    assert_eq!(render("Hello world!", json!({})), "Hello world!");
    let src = "no tags, just { braces } and % signs";
    assert_eq!(render(src, json!({})), src);
}

#[test]
fn renders_assigned_variable() {
    assert_eq!(
        render("{% assign bar = \"world\" %}Hello {{ bar }}!", json!({})),
        "Hello world!"
    );
}

#[test]
fn renders_captured_block() {
    assert_eq!(
        render(
            "{% capture bar %}world{% endcapture %}Hello {{ bar }}!",
            json!({})
        ),
        "Hello world!"
    );
}

#[test]
fn counters_step_the_stored_value() {
    assert_eq!(
        render(
            "{% decrement foo %}{{ foo }} {% increment foo %}{% increment foo %}{{ foo }}",
            json!({"foo": 42})
        ),
        "41 43"
    );
}

#[test]
fn applies_filters_to_output() {
    assert_eq!(
        render("Hello {{ x | upcase }}!", json!({"x": "world"})),
        "Hello WORLD!"
    );
}

#[test]
fn iterates_ascending_range() {
    assert_eq!(
        render("{% for x in (1..5) %}{{ x }}{% endfor %}", json!({})),
        "12345"
    );
}

#[test]
fn iterates_descending_range() {
    assert_eq!(
        render("{% for x in (5..1) %}{{ x }}{% endfor %}", json!({})),
        "54321"
    );
}

#[test]
fn break_stops_the_loop() {
    let friends = json!({"friends": ["Chandler", "Joey", "Monica", "Phoebe", "Rachel", "Ross"]});
    let out = render(
        "{% for f in friends %}{% if f == \"Phoebe\" %}{% break %}{% endif %}{{ f }} {% endfor %}",
        friends,
    );
    assert_eq!(out, "Chandler Joey Monica ");
}

#[test]
fn continue_skips_the_iteration() {
    let friends = json!({"friends": ["Chandler", "Joey", "Monica", "Phoebe", "Rachel", "Ross"]});
    let out = render(
        "{% for f in friends %}{% if f == \"Joey\" or f == \"Rachel\" %}{% continue %}{% endif %}{{ f }} {% endfor %}",
        friends,
    );
    assert_eq!(out, "Chandler Monica Phoebe Ross ");
}

#[test]
fn strict_variables_fail_on_undefined_reads() {
    let options = RenderOptions {
        strict_variables: true,
        ..RenderOptions::default()
    };
    let err = render_source("Hello {{ z }}!", &HashMap::new(), &options).unwrap_err();
    assert_eq!(err, BrineError::UndefinedVariable("z".to_string()));
    // The same template succeeds laxly.
    assert_eq!(render("Hello {{ z }}!", json!({})), "Hello !");
}

#[test]
fn lookup_renders_the_string_coercion_of_any_value() {
    assert_eq!(render("{{ x }}", json!({"x": null})), "");
    assert_eq!(render("{{ x }}", json!({"x": true})), "true");
    assert_eq!(render("{{ x }}", json!({"x": 42})), "42");
    assert_eq!(render("{{ x }}", json!({"x": 1.5})), "1.5");
    assert_eq!(render("{{ x }}", json!({"x": "s"})), "s");
    assert_eq!(render("{{ x }}", json!({"x": [1, "a", [2, 3]]})), "1a23");
}

#[test]
fn filters_apply_left_to_right() {
    assert_eq!(
        render(
            "{{ x | append: '!' | upcase }}|{{ x | upcase | append: '!' }}",
            json!({"x": "hi"})
        ),
        "HI!|HI!"
    );
    assert_eq!(
        render("{{ '7' | plus: 1 | times: 2 }}", json!({})),
        "16"
    );
}

#[test]
fn assignments_are_visible_to_later_nodes() {
    assert_eq!(
        render(
            "{% assign k = 1 %}{{ k }}{% assign k = 2 %}{{ k }}{{ k }}",
            json!({})
        ),
        "122"
    );
}

#[test]
fn capture_does_not_leak_assignments() {
    let out = render(
        "{% assign a = 'outer' %}{% capture c %}{% assign a = 'inner' %}{% endcapture %}{{ a }}",
        json!({}),
    );
    assert_eq!(out, "outer");
}

#[test]
fn break_and_continue_bind_to_the_innermost_loop() {
    let out = render(
        "{% for i in (1..3) %}{% for j in (1..3) %}{% if j == 2 %}{% continue %}{% endif %}{{ i }}.{{ j }} {% endfor %}{% endfor %}",
        json!({}),
    );
    assert_eq!(out, "1.1 1.3 2.1 2.3 3.1 3.3 ");
}

#[test]
fn for_options_compose_as_offset_limit_reverse() {
    let data = json!({"coll": [10, 20, 30, 40, 50, 60]});
    let out = render(
        "{% for x in coll offset: 1 limit: 3 reversed %}{{ x }} {% endfor %}",
        data,
    );
    // reverse(take(3, drop(1, coll)))
    assert_eq!(out, "40 30 20 ");
}

#[test]
fn lax_unknown_filter_blanks_the_expression() {
    assert_eq!(render("[{{ x | wat }}]", json!({"x": "v"})), "[]");
    let options = RenderOptions {
        strict_filters: true,
        ..RenderOptions::default()
    };
    let err = render_source("{{ x | wat }}", &HashMap::new(), &options).unwrap_err();
    assert_eq!(err, BrineError::UndefinedFilter("wat".to_string()));
}

#[test]
fn unless_renders_on_falsy_condition() {
    assert_eq!(
        render("{% unless ok %}nope{% endunless %}", json!({"ok": false})),
        "nope"
    );
    assert_eq!(
        render("{% unless ok %}nope{% endunless %}", json!({"ok": true})),
        ""
    );
}

#[test]
fn case_selects_the_first_matching_when() {
    let source = "{% case fruit %}{% when 'apple' %}pie{% when 'plum' %}jam{% else %}salad{% endcase %}";
    assert_eq!(render(source, json!({"fruit": "plum"})), "jam");
    assert_eq!(render(source, json!({"fruit": "kiwi"})), "salad");
    assert_eq!(render(source, json!({})), "salad");
}

#[test]
fn comparison_operators_follow_the_predicate_rules() {
    let data = json!({"n": 5, "s": "abc", "xs": [1, 2]});
    assert_eq!(render("{% if n >= 5 %}y{% endif %}", data.clone()), "y");
    assert_eq!(render("{% if n < 5.5 %}y{% endif %}", data.clone()), "y");
    // Ordering on non-numbers is false, not an error.
    assert_eq!(render("{% if s < 'b' %}y{% else %}n{% endif %}", data.clone()), "n");
    assert_eq!(render("{% if s contains 'bc' %}y{% endif %}", data.clone()), "y");
    assert_eq!(render("{% if xs contains 2 %}y{% endif %}", data.clone()), "y");
    assert_eq!(render("{% if n != 4 and n > 1 or missing %}y{% endif %}", data), "y");
}

#[test]
fn raw_block_suppresses_interpretation() {
    assert_eq!(
        render("{% raw %}{{ name }} {% if %}{% endraw %}", json!({"name": "x"})),
        "{{ name }} {% if %}"
    );
}

#[test]
fn range_endpoints_may_be_lookups() {
    assert_eq!(
        render(
            "{% for x in (lo..hi) %}{{ x }}{% endfor %}",
            json!({"lo": 2, "hi": 4})
        ),
        "234"
    );
}

#[test]
fn filter_pipeline_over_sequences() {
    let data = json!({"xs": ["b", "a", null, "b"]});
    assert_eq!(
        render("{{ xs | compact | uniq | sort | join: '-' }}", data),
        "a-b"
    );
}

#[test]
fn syntax_errors_carry_an_offset() {
    let err = render_source("ok {{ broken", &HashMap::new(), &RenderOptions::default()).unwrap_err();
    match err {
        BrineError::Syntax { offset, .. } => assert_eq!(offset, 3),
        other => panic!("expected syntax error, got {other:?}"),
    }
}
