//! Reading and writing input files.

use std::io::Write;

use fmi_check::{
    input::{write_input_file, InputData, ParseError},
    models::{feedthrough::Feedthrough, UserModel},
};

const INPUT: &str = "\
time,Float64_continuous_input,Float64_discrete_input,Int32_input,Boolean_input,Enumeration_input
0,0,0.5,1,0,1
0.25,-1.5e-3,0.5,1,0,1
0.25,2,1.25,-3,1,2
1,3.141592653589793,1.25,7,0,2
";

#[test_log::test]
fn test_write_and_read_back() {
    let md = Feedthrough::model_description();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(INPUT.as_bytes()).unwrap();
    let data = InputData::from_path(file.path(), &md).unwrap();
    assert_eq!(data.series.len(), 4);
    assert_eq!(data.series.timestamps(), &[0.0, 0.25, 0.25, 1.0]);
    assert_eq!(data.catalog.real_inputs().len(), 2);
    assert_eq!(data.catalog.integer_inputs().len(), 2);
    assert_eq!(data.catalog.boolean_inputs().len(), 1);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roundtrip.csv");
    write_input_file(&data, std::fs::File::create(&path).unwrap(), ';').unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("time;Float64_continuous_input;"));

    let read_back = InputData::from_path(&path, &md).unwrap();
    assert_eq!(read_back.series, data.series);
    assert!(read_back.discrete_change(1));
    assert!(!read_back.discrete_change(0));
}

#[test]
fn test_unknown_column() {
    let md = Feedthrough::model_description();
    let err = InputData::from_text("time,no_such_variable\n0,1\n", &md).unwrap_err();
    assert!(matches!(err, ParseError::InvalidInputVariable { .. }));
}
