use cml_map::extractor::extract_fragments;
use cml_map::literal::{field_number, field_text, parse_rows, to_literal, try_parse_rows};
use serde_json::json;

const PAGE: &str = r#"<html>
<head>
<script type="text/javascript" src="/js/leaflet.js"></script>
<script type="text/javascript">
var aggiornamento = '12:05';
var datostazione = [
    ['0','Cielo sereno','01/01/2024','12:00','5.5','10.2','11:40','-1.3','06:10','61'],
    ['X','','01/01/2024','11:50','---','','','','',''],
];
var coords = [
    ['101','Sant\'Omobono Terme','BG','290','330','','427'],
    ['102','Lecco "Bione"','LC','270','280','','214'],
];
</script>
</head>
<body><div id="mappa"></div></body>
</html>"#;

/// Fragments pulled from a realistic page parse into positional rows
#[test]
fn test_extract_then_parse_realistic_page() {
    let fragments = extract_fragments(PAGE).expect("both assignments present");

    let measurements = parse_rows(&fragments.measurements);
    let metadata = parse_rows(&fragments.metadata);
    assert_eq!(measurements.len(), 2);
    assert_eq!(metadata.len(), 2);

    assert_eq!(field_text(&metadata[0], 1).as_deref(), Some("Sant'Omobono Terme"));
    assert_eq!(field_text(&metadata[1], 1).as_deref(), Some("Lecco \"Bione\""));
    assert_eq!(field_number(&metadata[1], 6), 214.0);

    assert_eq!(field_number(&measurements[0], 7), -1.3);
    assert!(field_number(&measurements[1], 4).is_nan());
}

/// Re-serialized rows read back identically
#[test]
fn test_literal_survives_reserialization() {
    let fragments = extract_fragments(PAGE).expect("both assignments present");

    for fragment in [&fragments.measurements, &fragments.metadata] {
        let rows = try_parse_rows(fragment).expect("well-formed fragment");
        let reparsed = try_parse_rows(&to_literal(&rows)).expect("serializer output parses");
        assert_eq!(rows, reparsed);
    }
}

#[test]
fn test_control_characters_inside_strings() {
    let rows = try_parse_rows("[['riga\tuno', 'a\\nb']]").expect("parses");
    assert_eq!(rows[0], vec![json!("riga\tuno"), json!("a\nb")]);
}

/// Broken fragments never surface as partial data
#[test]
fn test_malformed_fragments_read_as_empty() {
    let malformed = [
        "[['101','Bergamo'",
        "[['101','Bergamo'] ['102','Lecco']]",
        "[['101', Bergamo]]",
        "[['101'], 'loose']",
        "[[1, 2,, 3]]",
        "new Array('101')",
    ];

    for fragment in malformed {
        assert!(
            parse_rows(fragment).is_empty(),
            "expected no rows for {:?}",
            fragment
        );
    }
}
