//! Builtin functions and value methods called from compiled programs.

use pretty_assertions::assert_eq;
use pyrite::{
    Interpreter, Value,
    bytecode::{ArgumentKind, FunctionBuilder, FunctionType, Literal, ModuleBuilder, Opcode, Program, UnaryOperator},
};

/// Runs a module body built by `build` and returns the value it stored as `result`.
fn evaluate(build: impl FnOnce(&mut FunctionBuilder, &mut ModuleBuilder) -> u32) -> Value {
    let mut module = ModuleBuilder::new("main");
    let mut main = FunctionBuilder::new("<module>", FunctionType::Module);
    let result = build(&mut main, &mut module);
    main.assign_name(&mut module, "result", result);
    module.add_function(main.finish());

    let mut program = Program::new();
    program.add_module(module.build());
    let mut interpreter = Interpreter::new(program);
    interpreter.run_module("main").unwrap();
    if let Some(exception) = interpreter.unhandled_exception() {
        panic!("unexpected exception: {exception}");
    }
    interpreter.global_scope().unwrap().get_local("result").unwrap()
}

fn ints(items: &[i64]) -> Value {
    Value::list(items.iter().copied().map(Value::Int).collect())
}

fn int_list(body: &mut FunctionBuilder, module: &mut ModuleBuilder, items: &[i64]) -> u32 {
    let registers: Vec<u32> = items.iter().map(|item| body.load_int(module, *item)).collect();
    body.build_list(&registers)
}

#[test]
fn sorted_accepts_a_user_key_function() {
    let result = evaluate(|main, module| {
        // def neg(x): return -x
        let mut neg = FunctionBuilder::new("neg", FunctionType::Plain);
        neg.argument(module, "x", ArgumentKind::Positional, None);
        let x = neg.load_name(module, "x");
        let negated = neg.register();
        neg.emit(
            Opcode::UnaryOp,
            &[negated.into(), x.into(), (UnaryOperator::Neg as u32).into()],
        );
        neg.ret(Some(negated));
        let neg = module.add_function(neg.finish());

        let key_fn = main.make_function(neg);
        let list = int_list(main, module, &[3, 1, 2]);
        let sorted = main.load_name(module, "sorted");
        let key = module.identifier("key");
        let result = main.register();
        main.call_into(Some(result), sorted, &[list], &[(key, key_fn)]);
        result
    });
    assert_eq!(result, ints(&[3, 2, 1]));
}

#[test]
fn sorted_in_reverse_with_a_builtin_key() {
    let result = evaluate(|main, module| {
        let words: Vec<u32> = ["bb", "a", "ccc"].iter().map(|word| main.load_str(module, word)).collect();
        let list = main.build_list(&words);
        let sorted = main.load_name(module, "sorted");
        let len = main.load_name(module, "len");
        let flag = main.load_literal(module, Literal::Bool(true));
        let key = module.identifier("key");
        let reverse = module.identifier("reverse");
        let result = main.register();
        main.call_into(Some(result), sorted, &[list], &[(key, len), (reverse, flag)]);
        result
    });
    assert_eq!(
        result,
        Value::list(vec![Value::str("ccc"), Value::str("bb"), Value::str("a")])
    );
}

#[test]
fn min_max_and_sum() {
    let result = evaluate(|main, module| {
        let three = main.load_int(module, 3);
        let one = main.load_int(module, 1);
        let two = main.load_int(module, 2);
        let min = main.load_name(module, "min");
        let smallest = main.call(min, &[three, one, two]);

        let list = int_list(main, module, &[4, 9, 2]);
        let max = main.load_name(module, "max");
        let largest = main.call(max, &[list]);

        let sum = main.load_name(module, "sum");
        let ten = main.load_int(module, 10);
        let total = main.call(sum, &[list, ten]);

        let empty = main.build_list(&[]);
        let zero = main.load_int(module, 0);
        let default = module.identifier("default");
        let fallback = main.register();
        main.call_into(Some(fallback), min, &[empty], &[(default, zero)]);
        main.build_tuple(&[smallest, largest, total, fallback])
    });
    assert_eq!(
        result,
        Value::tuple(vec![Value::Int(1), Value::Int(9), Value::Int(25), Value::Int(0)])
    );
}

#[test]
fn string_join_and_split() {
    let result = evaluate(|main, module| {
        let separator = main.load_str(module, ", ");
        let join = main.get_attr(module, separator, "join");
        let a = main.load_str(module, "a");
        let b = main.load_str(module, "b");
        let parts = main.build_list(&[a, b]);
        let joined = main.call(join, &[parts]);

        let text = main.load_str(module, "  x y   z ");
        let split = main.get_attr(module, text, "split");
        let words = main.call(split, &[]);
        main.build_tuple(&[joined, words])
    });
    assert_eq!(
        result,
        Value::tuple(vec![
            Value::str("a, b"),
            Value::list(vec![Value::str("x"), Value::str("y"), Value::str("z")]),
        ])
    );
}

#[test]
fn list_methods_mutate_every_alias() {
    let result = evaluate(|main, module| {
        let list = int_list(main, module, &[1]);
        main.assign_name(module, "xs", list);
        let alias = main.load_name(module, "xs");
        let append = main.get_attr(module, alias, "append");
        let two = main.load_int(module, 2);
        main.call_into(None, append, &[two], &[]);
        main.load_name(module, "xs")
    });
    assert_eq!(result, ints(&[1, 2]));
}

#[test]
fn isinstance_checks_builtin_types() {
    let result = evaluate(|main, module| {
        let isinstance = main.load_name(module, "isinstance");
        let flag = main.load_literal(module, Literal::Bool(true));
        let int = main.load_name(module, "int");
        let bool_is_int = main.call(isinstance, &[flag, int]);
        let text = main.load_str(module, "x");
        let str_is_int = main.call(isinstance, &[text, int]);
        main.build_tuple(&[bool_is_int, str_is_int])
    });
    assert_eq!(result, Value::tuple(vec![Value::Bool(true), Value::Bool(false)]));
}
