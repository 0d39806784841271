// Reader: source text -> forms.
//
// Forms are ordinary runtime values. Dictionary literals are the one exception that
// touches the heap: `{:k v}` becomes an environment whose values are still unevaluated.

use crate::runtime::environment::Name;
use crate::runtime::heap::Heap;
use crate::runtime::values::Value;
use pest::iterators::Pair;
use pest::Parser;

#[derive(pest_derive::Parser)]
#[grammar = "parser/reader.pest"] // Path relative to src/
pub struct ReaderParser;

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),

    #[error("Invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("Dictionary literal needs an even number of forms: {0}")]
    OddDictionary(String),

    #[error("Dictionary keys must be keywords or symbols, got {0}")]
    InvalidKey(String),

    #[error("Unexpected syntax element: {0}")]
    Unexpected(String),
}

/// Reads every top-level form in `source`, in order.
pub fn read(source: &str, heap: &mut Heap) -> Result<Vec<Value>, ReadError> {
    let mut pairs = ReaderParser::parse(Rule::program, source).map_err(Box::new)?;
    let Some(program) = pairs.next() else {
        return Ok(Vec::new());
    };
    program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(|p| build_form(p, heap))
        .collect()
}

/// Reads exactly one form; convenient for tests and the REPL.
pub fn read_one(source: &str, heap: &mut Heap) -> Result<Value, ReadError> {
    let mut forms = read(source, heap)?;
    match forms.len() {
        1 => Ok(forms.remove(0)),
        n => Err(ReadError::Unexpected(format!("expected one form, found {}", n))),
    }
}

fn build_form(pair: Pair<Rule>, heap: &mut Heap) -> Result<Value, ReadError> {
    match pair.as_rule() {
        Rule::quoted => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| ReadError::Unexpected("empty quote".to_string()))?;
            Ok(Value::list(vec![
                Value::symbol("quote"),
                build_form(inner, heap)?,
            ]))
        }
        Rule::list => {
            let items = pair
                .into_inner()
                .map(|p| build_form(p, heap))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::list(items))
        }
        Rule::dict => build_dictionary(pair, heap),
        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Value::string(&unescape(raw)))
        }
        Rule::float => pair
            .as_str()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ReadError::InvalidNumber(pair.as_str().to_string())),
        Rule::integer => pair
            .as_str()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| ReadError::InvalidNumber(pair.as_str().to_string())),
        Rule::keyword => Ok(Value::keyword(&pair.as_str()[1..])),
        Rule::symbol => Ok(match pair.as_str() {
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            "nil" => Value::Nil,
            name => Value::symbol(name),
        }),
        other => Err(ReadError::Unexpected(format!("{:?}", other))),
    }
}

fn build_dictionary(pair: Pair<Rule>, heap: &mut Heap) -> Result<Value, ReadError> {
    let text = pair.as_str().to_string();
    let items = pair
        .into_inner()
        .map(|p| build_form(p, heap))
        .collect::<Result<Vec<_>, _>>()?;
    if items.len() % 2 != 0 {
        return Err(ReadError::OddDictionary(text));
    }
    let dict = heap.new_dictionary();
    for entry in items.chunks(2) {
        let name =
            Name::from_value(&entry[0]).ok_or_else(|| ReadError::InvalidKey(entry[0].to_string()))?;
        heap.extend(dict, name, entry[1].clone())
            .map_err(|e| ReadError::Unexpected(e.to_string()))?;
    }
    Ok(Value::Environment(dict))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn read_str(source: &str) -> Vec<Value> {
        let mut heap = Heap::new();
        read(source, &mut heap).expect("should read")
    }

    #[test]
    fn reads_atoms() {
        assert_eq!(
            read_str("42 -7 1.5 \"hi\\n\" :key sym true false nil"),
            vec![
                Value::Integer(42),
                Value::Integer(-7),
                Value::Float(1.5),
                Value::string("hi\n"),
                Value::keyword("key"),
                Value::symbol("sym"),
                Value::Boolean(true),
                Value::Boolean(false),
                Value::Nil,
            ]
        );
    }

    #[test]
    fn reads_lists_quotes_and_comments() {
        let forms = read_str("; leading comment\n(+ 1 (f x)) 'a '()");
        assert_eq!(forms[0].to_string(), "(+ 1 (f x))");
        assert_eq!(forms[1].to_string(), "(quote a)");
        assert_eq!(forms[2].to_string(), "(quote ())");
    }

    #[test]
    fn symbols_may_contain_punctuation() {
        let forms = read_str("reset! def? &rest -> - 12abc");
        let names: Vec<String> = forms.iter().map(|f| f.to_string()).collect();
        assert_eq!(names, vec!["reset!", "def?", "&rest", "->", "-", "12abc"]);
    }

    #[test]
    fn reads_dictionary_literals_into_the_heap() {
        let mut heap = Heap::new();
        let form = read_one("{:a 1 :b (+ 1 1)}", &mut heap).unwrap();
        assert_eq!(heap.render(&form), "{:a 1 :b (+ 1 1)}");
    }

    #[test]
    fn rejects_malformed_input() {
        let mut heap = Heap::new();
        assert!(matches!(read("(1 2", &mut heap), Err(ReadError::Syntax(_))));
        assert!(matches!(read(")", &mut heap), Err(ReadError::Syntax(_))));
        assert!(matches!(
            read("{:a}", &mut heap),
            Err(ReadError::OddDictionary(_))
        ));
        assert!(matches!(
            read("{1 2}", &mut heap),
            Err(ReadError::InvalidKey(_))
        ));
        assert!(matches!(
            read("99999999999999999999", &mut heap),
            Err(ReadError::InvalidNumber(_))
        ));
    }
}
